use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use ptybroker_protocol::{ExitSignal, SessionEvent};
use tokio::sync::mpsc;
use tracing::trace;

/// Receives output and exit notifications for one subscribed session.
///
/// Called from the connection's reader task; implementations must not block.
pub trait SessionHandler: Send + Sync + 'static {
    fn on_data(&self, data: &str);

    fn on_exit(&self, exit_code: i32, signal: Option<&ExitSignal>);
}

/// Session handler built from a pair of closures.
pub struct FnHandler<D, E> {
    on_data: D,
    on_exit: E,
}

impl<D, E> FnHandler<D, E>
where
    D: Fn(&str) + Send + Sync + 'static,
    E: Fn(i32, Option<&ExitSignal>) + Send + Sync + 'static,
{
    pub fn new(on_data: D, on_exit: E) -> Self {
        Self { on_data, on_exit }
    }
}

impl<D, E> SessionHandler for FnHandler<D, E>
where
    D: Fn(&str) + Send + Sync + 'static,
    E: Fn(i32, Option<&ExitSignal>) + Send + Sync + 'static,
{
    fn on_data(&self, data: &str) {
        (self.on_data)(data)
    }

    fn on_exit(&self, exit_code: i32, signal: Option<&ExitSignal>) {
        (self.on_exit)(exit_code, signal)
    }
}

/// Forwards events into a channel. A closed receiver drops them.
impl SessionHandler for mpsc::UnboundedSender<SessionEvent> {
    fn on_data(&self, data: &str) {
        let _ = self.send(SessionEvent::Data(data.to_string()));
    }

    fn on_exit(&self, exit_code: i32, signal: Option<&ExitSignal>) {
        let _ = self.send(SessionEvent::Exit {
            exit_code,
            signal: signal.cloned(),
        });
    }
}

/// Subscriptions keyed by session id.
///
/// Events for a session nobody subscribed to are dropped, never buffered.
#[derive(Default)]
pub(crate) struct Subscriptions {
    handlers: Mutex<HashMap<String, Arc<dyn SessionHandler>>>,
}

impl Subscriptions {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn SessionHandler>>> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `handler`, replacing any previous one. Returns whether one was replaced.
    pub fn insert(&self, session_id: &str, handler: Arc<dyn SessionHandler>) -> bool {
        self.lock().insert(session_id.to_string(), handler).is_some()
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.lock().remove(session_id).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Deliver `event` to the session's handler. Returns whether one was found.
    pub fn dispatch(&self, session_id: &str, event: &SessionEvent) -> bool {
        // Invoke outside the lock so a handler may (un)subscribe.
        let handler = self.lock().get(session_id).cloned();
        let Some(handler) = handler else {
            trace!(event = "client.router.event_dropped", session_id = session_id);
            return false;
        };
        match event {
            SessionEvent::Data(data) => handler.on_data(data),
            SessionEvent::Exit { exit_code, signal } => handler.on_exit(*exit_code, signal.as_ref()),
        }
        true
    }
}
