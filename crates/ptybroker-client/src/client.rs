use std::sync::Arc;

use ptybroker_protocol::{
    BufferSnapshot, ClientMessage, PtyConfig, Reply, ResizePayload, SessionEvent, SessionInfo,
};
use ptybroker_reaper::TerminationOutcome;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionSettings, ConnectionState};
use crate::errors::ClientError;
use crate::router::SessionHandler;
use crate::supervisor::{DaemonLauncher, ProcessLauncher, Supervisor};
use crate::transport::{Connector, EndpointConnector};

/// Handle to the PTY daemon.
///
/// Construct one per process and share it; clones use the same connection.
/// Call [`BrokerClient::shutdown`] from the application's exit path.
#[derive(Clone)]
pub struct BrokerClient {
    manager: Arc<ConnectionManager>,
}

impl std::fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerClient")
            .field("state", &self.manager.state())
            .finish()
    }
}

impl BrokerClient {
    /// Client for the configured endpoint, spawning the configured daemon
    /// binary when nothing is listening.
    pub fn new(config: &ClientConfig) -> Self {
        let connector = EndpointConnector::new(config.endpoint());
        let launcher = ProcessLauncher::new(config.daemon_binary.clone());
        Self::with_parts(config, Arc::new(connector), Arc::new(launcher))
    }

    /// Client with a custom transport and daemon launcher.
    pub fn with_parts(
        config: &ClientConfig,
        connector: Arc<dyn Connector>,
        launcher: Arc<dyn DaemonLauncher>,
    ) -> Self {
        let supervisor = Supervisor::new(launcher, config.kill_timeout());
        Self {
            manager: ConnectionManager::new(
                connector,
                supervisor,
                ConnectionSettings::from(config),
            ),
        }
    }

    /// Connect now instead of on the first operation.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.manager.connect().await
    }

    /// Start a new PTY session and return its id.
    pub async fn create_pty(&self, config: PtyConfig) -> Result<String, ClientError> {
        info!(
            event = "client.session.create_started",
            shell = %config.shell,
            cwd = %config.cwd,
            rows = config.rows,
            cols = config.cols,
        );
        let result = match self.manager.request(ClientMessage::Create { data: config }).await {
            Ok(Reply::Created { session_id }) => Ok(session_id),
            Ok(other) => Err(unexpected("created", &other)),
            Err(e) => Err(e),
        };
        match &result {
            Ok(session_id) => {
                info!(event = "client.session.create_completed", session_id = %session_id)
            }
            Err(e) => error!(event = "client.session.create_failed", error = %e),
        }
        result
    }

    /// Send input to a session. No-op without a connection.
    pub fn write(&self, session_id: &str, data: &str) {
        self.manager.send_one_way(ClientMessage::Write {
            id: session_id.to_string(),
            data: data.to_string(),
        });
    }

    pub fn resize(&self, session_id: &str, cols: u16, rows: u16) {
        self.manager.send_one_way(ClientMessage::Resize {
            id: session_id.to_string(),
            data: ResizePayload { cols, rows },
        });
    }

    /// Ask the daemon to kill a session and stop routing its events here.
    pub fn kill(&self, session_id: &str) {
        let had_subscription = self.manager.subscriptions().remove(session_id);
        info!(
            event = "client.session.kill_started",
            session_id = session_id,
            had_subscription = had_subscription,
        );
        self.manager.send_one_way(ClientMessage::Kill {
            id: session_id.to_string(),
        });
    }

    pub async fn list(&self) -> Result<Vec<SessionInfo>, ClientError> {
        match self.manager.request(ClientMessage::List).await? {
            Reply::List(sessions) => {
                info!(event = "client.session.list_completed", count = sessions.len());
                Ok(sessions)
            }
            other => Err(unexpected("list", &other)),
        }
    }

    /// Route a session's output and exit to `handler`, replacing any
    /// previous handler for it, and tell the daemon.
    ///
    /// Without a connection only the local registration happens; the
    /// subscription is announced once a connection is established.
    pub fn subscribe(&self, session_id: &str, handler: impl SessionHandler) {
        self.subscribe_arc(session_id, Arc::new(handler));
    }

    /// [`subscribe`](Self::subscribe) with events delivered on a channel.
    pub fn subscribe_channel(&self, session_id: &str) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe_arc(session_id, Arc::new(tx));
        rx
    }

    fn subscribe_arc(&self, session_id: &str, handler: Arc<dyn SessionHandler>) {
        let replaced = self.manager.subscriptions().insert(session_id, handler);
        if replaced {
            warn!(event = "client.session.subscription_replaced", session_id = session_id);
        }
        self.manager.send_one_way(ClientMessage::Subscribe {
            id: session_id.to_string(),
        });
        info!(event = "client.session.subscribe_completed", session_id = session_id);
    }

    pub fn unsubscribe(&self, session_id: &str) {
        self.manager.subscriptions().remove(session_id);
        self.manager.send_one_way(ClientMessage::Unsubscribe {
            id: session_id.to_string(),
        });
    }

    /// Output the daemon kept for a session, for catching up on what was
    /// missed while unsubscribed.
    pub async fn get_buffer(&self, session_id: &str) -> Result<BufferSnapshot, ClientError> {
        let message = ClientMessage::GetBuffer {
            id: session_id.to_string(),
        };
        match self.manager.request(message).await? {
            Reply::Buffer(snapshot) => Ok(snapshot),
            other => Err(unexpected("buffer", &other)),
        }
    }

    /// Whether the daemon answers. Never fails.
    pub async fn ping(&self) -> bool {
        match self.manager.request(ClientMessage::Ping).await {
            Ok(Reply::Pong) => true,
            Ok(other) => {
                warn!(event = "client.session.ping_failed", reply = other.kind());
                false
            }
            Err(e) => {
                warn!(event = "client.session.ping_failed", error = %e);
                false
            }
        }
    }

    /// Drop the connection but leave the daemon running.
    pub fn disconnect(&self) {
        self.manager.disconnect();
    }

    /// Tear everything down. A daemon this client spawned is terminated
    /// gracefully; one it only connected to is left alone.
    ///
    /// Returns how the spawned daemon ended, if there was one.
    pub async fn shutdown(&self) -> Option<TerminationOutcome> {
        self.manager.shutdown().await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn pending_requests(&self) -> usize {
        self.manager.pending().len()
    }

    pub fn subscription_count(&self) -> usize {
        self.manager.subscriptions().len()
    }

    /// Whether this client started the daemon it talks to.
    pub fn owns_daemon(&self) -> bool {
        self.manager.owns_daemon()
    }
}

fn unexpected(expected: &'static str, reply: &Reply) -> ClientError {
    let err = ClientError::UnexpectedReply {
        expected,
        got: reply.kind(),
    };
    error!(event = "client.session.unexpected_reply", error = %err);
    err
}
