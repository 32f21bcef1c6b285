use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use ptybroker_protocol::{ClientMessage, Inbound, JsonLineCodec, Outbound, Reply, Route};
use ptybroker_reaper::TerminationOutcome;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::correlator::PendingRequests;
use crate::errors::ClientError;
use crate::router::Subscriptions;
use crate::supervisor::Supervisor;
use crate::transport::{BoxReader, BoxWriter, Connector, Transport};

type Codec = JsonLineCodec<Inbound>;

/// Lifecycle of the client's single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: set by `shutdown()`.
    ShuttingDown,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ShuttingDown => "shutting_down",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exponential backoff for automatic reconnects.
///
/// `delay(n) = min(base * 2^n, max)`; attempts are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = (self.base.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(millis).min(self.max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            max: Duration::from_millis(10_000),
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionSettings {
    pub connect_timeout: Duration,
    pub spawn_warmup: Duration,
    pub request_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl From<&ClientConfig> for ConnectionSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            spawn_warmup: config.spawn_warmup(),
            request_timeout: config.request_timeout(),
            reconnect: ReconnectPolicy {
                base: Duration::from_millis(config.reconnect_base_ms),
                max: Duration::from_millis(config.reconnect_max_ms),
                max_attempts: config.max_reconnect_attempts,
            },
        }
    }
}

/// The live connection: its outbound queue and the token that stops its tasks.
struct Link {
    generation: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

struct Shared {
    state: ConnectionState,
    link: Option<Link>,
    generation: u64,
    reconnect_attempts: u32,
    /// Bumped by explicit teardown so already-armed reconnect timers stand down.
    reconnect_epoch: u64,
}

struct AttemptRecord {
    seq: u64,
    outcome: Result<(), ClientError>,
}

/// Owns the connection to the daemon, including connect-or-spawn and
/// automatic reconnection after an unexpected close.
pub(crate) struct ConnectionManager {
    connector: Arc<dyn Connector>,
    supervisor: Supervisor,
    pending: Arc<PendingRequests>,
    subscriptions: Arc<Subscriptions>,
    settings: ConnectionSettings,
    shared: Mutex<Shared>,
    connect_lock: tokio::sync::Mutex<AttemptRecord>,
    attempt_seq: AtomicU64,
    root: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        supervisor: Supervisor,
        settings: ConnectionSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            connector,
            supervisor,
            pending: PendingRequests::new(),
            subscriptions: Arc::new(Subscriptions::default()),
            settings,
            shared: Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                link: None,
                generation: 0,
                reconnect_attempts: 0,
                reconnect_epoch: 0,
            }),
            connect_lock: tokio::sync::Mutex::new(AttemptRecord {
                seq: 0,
                outcome: Ok(()),
            }),
            attempt_seq: AtomicU64::new(0),
            root: CancellationToken::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn pending(&self) -> &Arc<PendingRequests> {
        &self.pending
    }

    pub fn subscriptions(&self) -> &Arc<Subscriptions> {
        &self.subscriptions
    }

    pub fn owns_daemon(&self) -> bool {
        self.supervisor.owns_daemon()
    }

    fn settled(&self) -> Option<Result<(), ClientError>> {
        match self.lock().state {
            ConnectionState::Connected => Some(Ok(())),
            ConnectionState::ShuttingDown => Some(Err(ClientError::ShuttingDown)),
            ConnectionState::Disconnected | ConnectionState::Connecting => None,
        }
    }

    /// Make sure a connection is up, spawning the daemon if nothing answers.
    ///
    /// Concurrent callers share one attempt: whoever queued behind a failed
    /// attempt gets that failure instead of starting another spawn.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        if let Some(result) = self.settled() {
            return result;
        }

        let observed = self.attempt_seq.load(Ordering::Acquire);
        let mut record = self.connect_lock.lock().await;
        if let Some(result) = self.settled() {
            return result;
        }
        if record.seq != observed
            && let Err(e) = &record.outcome
        {
            debug!(event = "client.connection.connect_shared_failure", error = %e);
            return Err(e.clone());
        }

        let outcome = self.establish().await;
        record.seq += 1;
        record.outcome = outcome.clone();
        self.attempt_seq.store(record.seq, Ordering::Release);
        outcome
    }

    async fn establish(self: &Arc<Self>) -> Result<(), ClientError> {
        {
            let mut shared = self.lock();
            if shared.state == ConnectionState::ShuttingDown {
                return Err(ClientError::ShuttingDown);
            }
            shared.state = ConnectionState::Connecting;
        }
        let _reset = ConnectingReset { manager: self };
        let endpoint = self.connector.describe();
        info!(event = "client.connection.connect_started", endpoint = %endpoint);

        let first_attempt = tokio::select! {
            biased;
            _ = self.root.cancelled() => return Err(ClientError::ShuttingDown),
            result = self.try_connect() => result,
        };
        let first_failure = match first_attempt {
            Ok(transport) => return self.attach(transport),
            Err(reason) => reason,
        };
        info!(
            event = "client.connection.daemon_unreachable",
            endpoint = %endpoint,
            reason = %first_failure,
        );

        if self.root.is_cancelled() {
            return Err(ClientError::ShuttingDown);
        }
        self.supervisor.spawn_daemon()?;

        let warmup = self.settings.spawn_warmup;
        let second_attempt = tokio::select! {
            biased;
            _ = self.root.cancelled() => None,
            result = async {
                tokio::time::sleep(warmup).await;
                self.try_connect().await
            } => Some(result),
        };
        let Some(second_attempt) = second_attempt else {
            // shutdown() may have drained the supervisor before this spawn landed.
            let outcome = self.supervisor.shutdown().await;
            info!(
                event = "client.connection.connect_abandoned",
                endpoint = %endpoint,
                daemon_stopped = outcome.is_some(),
            );
            return Err(ClientError::ShuttingDown);
        };

        match second_attempt {
            Ok(transport) => self.attach(transport),
            Err(reason) => {
                error!(
                    event = "client.connection.connect_failed",
                    endpoint = %endpoint,
                    reason = %reason,
                );
                Err(ClientError::Connection {
                    message: format!(
                        "daemon spawned but {} is still unreachable: {}",
                        endpoint, reason
                    ),
                })
            }
        }
    }

    async fn try_connect(&self) -> Result<Transport, String> {
        let timeout = self.settings.connect_timeout;
        match tokio::time::timeout(timeout, self.connector.connect()).await {
            Ok(Ok(transport)) => Ok(transport),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {}ms", timeout.as_millis())),
        }
    }

    fn attach(self: &Arc<Self>, transport: Transport) -> Result<(), ClientError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.root.child_token();

        let (generation, resubscribed) = {
            let mut shared = self.lock();
            if shared.state == ConnectionState::ShuttingDown {
                return Err(ClientError::ShuttingDown);
            }
            // The daemon forgets subscribers with the connection.
            let session_ids = self.subscriptions.session_ids();
            for id in &session_ids {
                let _ = tx.send(Outbound::one_way(ClientMessage::Subscribe { id: id.clone() }));
            }
            shared.generation += 1;
            let generation = shared.generation;
            let previous = shared.link.replace(Link {
                generation,
                outbound: tx,
                cancel: cancel.clone(),
            });
            if let Some(previous) = previous {
                previous.cancel.cancel();
            }
            shared.state = ConnectionState::Connected;
            shared.reconnect_attempts = 0;
            (generation, session_ids.len())
        };

        let reader = FramedRead::new(transport.reader, Codec::new());
        let writer = FramedWrite::new(transport.writer, Codec::new());

        let weak = Arc::downgrade(self);
        let pending = Arc::clone(&self.pending);
        let subscriptions = Arc::clone(&self.subscriptions);
        let read_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Some(reason) = read_loop(reader, &pending, &subscriptions, read_cancel).await
                && let Some(manager) = weak.upgrade()
            {
                manager.handle_disconnect(generation, &reason);
            }
        });

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            if let Some(reason) = write_loop(writer, rx, cancel).await
                && let Some(manager) = weak.upgrade()
            {
                manager.handle_disconnect(generation, &reason);
            }
        });

        info!(
            event = "client.connection.connect_completed",
            endpoint = %self.connector.describe(),
            generation = generation,
            resubscribed = resubscribed,
        );
        Ok(())
    }

    /// Send `message` with a fresh request id and wait for its reply.
    pub async fn request(self: &Arc<Self>, message: ClientMessage) -> Result<Reply, ClientError> {
        debug_assert!(message.expects_reply(), "{} gets no reply", message.kind());
        self.connect().await?;

        let kind = message.kind();
        let request = self.pending.register(kind);
        let outbound = Outbound::request(message, request.id());
        {
            let shared = self.lock();
            let sent = shared
                .link
                .as_ref()
                .is_some_and(|link| link.outbound.send(outbound).is_ok());
            if !sent {
                return Err(match shared.state {
                    ConnectionState::ShuttingDown => ClientError::ShuttingDown,
                    _ => ClientError::ConnectionClosed,
                });
            }
        }
        debug!(
            event = "client.connection.request_sent",
            request_id = request.id(),
            kind = kind,
        );
        request.wait(self.settings.request_timeout).await
    }

    /// Queue a one-way command. Without a connection this is a logged no-op.
    pub fn send_one_way(&self, message: ClientMessage) -> bool {
        debug_assert!(!message.expects_reply(), "{} needs a request id", message.kind());
        let kind = message.kind();
        let shared = self.lock();
        let Some(link) = &shared.link else {
            warn!(
                event = "client.connection.send_skipped",
                kind = kind,
                state = %shared.state,
                "No connection to the PTY daemon; command dropped",
            );
            return false;
        };
        if link.outbound.send(Outbound::one_way(message)).is_err() {
            warn!(event = "client.connection.send_failed", kind = kind);
            return false;
        }
        true
    }

    /// Tear down connection `generation` after it closed on its own.
    fn handle_disconnect(self: &Arc<Self>, generation: u64, reason: &str) {
        {
            let mut shared = self.lock();
            let current = shared.link.as_ref().map(|link| link.generation);
            if current != Some(generation) {
                return;
            }
            if let Some(link) = shared.link.take() {
                link.cancel.cancel();
            }
            if shared.state != ConnectionState::ShuttingDown {
                shared.state = ConnectionState::Disconnected;
            }
            // Under the lock so no request on a newer connection gets failed.
            self.pending.fail_all(ClientError::ConnectionClosed);
        }
        warn!(
            event = "client.connection.closed",
            generation = generation,
            reason = %reason,
        );
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let policy = self.settings.reconnect;
        let (attempt, epoch) = {
            let mut shared = self.lock();
            if shared.state == ConnectionState::ShuttingDown {
                return;
            }
            if shared.reconnect_attempts >= policy.max_attempts {
                warn!(
                    event = "client.connection.reconnect_exhausted",
                    attempts = shared.reconnect_attempts,
                    "Giving up on automatic reconnects until the next operation",
                );
                return;
            }
            shared.reconnect_attempts += 1;
            (shared.reconnect_attempts, shared.reconnect_epoch)
        };

        let delay = policy.delay(attempt);
        info!(
            event = "client.connection.reconnect_scheduled",
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
        );

        let weak = Arc::downgrade(self);
        let cancel = self.root.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(manager) = weak.upgrade() {
                        manager.reconnect(attempt, epoch).await;
                    }
                }
            }
        });
    }

    async fn reconnect(self: &Arc<Self>, attempt: u32, epoch: u64) {
        if self.lock().reconnect_epoch != epoch {
            debug!(event = "client.connection.reconnect_cancelled", attempt = attempt);
            return;
        }
        info!(event = "client.connection.reconnect_started", attempt = attempt);
        match self.connect().await {
            Ok(()) => info!(event = "client.connection.reconnect_completed", attempt = attempt),
            Err(ClientError::ShuttingDown) => {}
            Err(e) => {
                warn!(
                    event = "client.connection.reconnect_failed",
                    attempt = attempt,
                    error = %e,
                );
                self.schedule_reconnect();
            }
        }
    }

    /// Close the connection without touching the daemon. No automatic
    /// reconnect follows; the next operation connects again.
    pub fn disconnect(&self) {
        let link = {
            let mut shared = self.lock();
            shared.reconnect_epoch += 1;
            if shared.state != ConnectionState::ShuttingDown {
                shared.state = ConnectionState::Disconnected;
            }
            let link = shared.link.take();
            self.pending.fail_all(ClientError::ConnectionClosed);
            link
        };
        if let Some(link) = link {
            link.cancel.cancel();
            info!(
                event = "client.connection.disconnect_completed",
                generation = link.generation,
            );
        }
    }

    /// Close everything and stop a daemon this client spawned.
    pub async fn shutdown(&self) -> Option<TerminationOutcome> {
        info!(event = "client.connection.shutdown_started");
        {
            let mut shared = self.lock();
            shared.state = ConnectionState::ShuttingDown;
            shared.reconnect_epoch += 1;
            if let Some(link) = shared.link.take() {
                link.cancel.cancel();
            }
            self.pending.fail_all(ClientError::ShuttingDown);
        }
        self.root.cancel();
        self.subscriptions.clear();

        let outcome = self.supervisor.shutdown().await;
        info!(
            event = "client.connection.shutdown_completed",
            daemon_stopped = outcome.is_some(),
        );
        outcome
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// Returns a connect attempt that was abandoned midway to `Disconnected`.
struct ConnectingReset<'a> {
    manager: &'a ConnectionManager,
}

impl Drop for ConnectingReset<'_> {
    fn drop(&mut self) {
        let mut shared = self.manager.lock();
        if shared.state == ConnectionState::Connecting {
            shared.state = ConnectionState::Disconnected;
        }
    }
}

/// Decode inbound frames until the stream ends.
///
/// `None` when cancelled, otherwise why the stream closed.
async fn read_loop(
    mut frames: FramedRead<BoxReader, Codec>,
    pending: &PendingRequests,
    subscriptions: &Subscriptions,
    cancel: CancellationToken,
) -> Option<String> {
    let stopped = loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break None,
            frame = frames.next() => frame,
        };
        match frame {
            Some(Ok(message)) => dispatch(message, pending, subscriptions),
            Some(Err(e)) => break Some(e.to_string()),
            None => break Some("daemon closed the connection".to_string()),
        }
    };
    let dropped = frames.decoder().dropped_lines();
    if dropped > 0 {
        warn!(event = "client.connection.reader_stopped", dropped_lines = dropped);
    }
    stopped
}

fn dispatch(message: Inbound, pending: &PendingRequests, subscriptions: &Subscriptions) {
    match message.route() {
        Route::Reply { request_id, reply } => {
            pending.resolve(&request_id, reply);
        }
        Route::Event { session_id, event } => {
            subscriptions.dispatch(&session_id, &event);
        }
        Route::Unsolicited { error } => {
            warn!(event = "client.connection.daemon_error", error = %error);
        }
        Route::Malformed {
            request_id,
            kind,
            error,
        } => {
            let rejected = ClientError::MalformedReply {
                request_id: request_id.clone(),
                kind,
                message: error,
            };
            pending.reject(&request_id, rejected);
        }
    }
}

async fn write_loop(
    mut sink: FramedWrite<BoxWriter, Codec>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    cancel: CancellationToken,
) -> Option<String> {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return None,
            message = outbound.recv() => message?,
        };
        if let Err(e) = sink.send(message).await {
            return Some(format!("write failed: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{DuplexConnector, FakeLauncher, manager_with};
    use ptybroker_protocol::SessionEvent;
    use tokio::time::Instant;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_reconnect_delays() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=5)
            .map(|n| policy.delay(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 10_000, 10_000]);
        assert_eq!(policy.delay(0), ms(1000));
        assert_eq!(policy.delay(200), ms(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_directly_when_daemon_is_up() {
        let (connector, _servers) = DuplexConnector::new(true);
        let launcher = FakeLauncher::new();
        let manager = manager_with(connector.clone(), launcher.clone(), ClientConfig::default());

        manager.connect().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(connector.attempts(), 1);
        assert_eq!(launcher.launches(), 0);

        manager.connect().await.unwrap();
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawns_daemon_then_retries_once_after_warmup() {
        let (connector, _servers) = DuplexConnector::new(false);
        let launcher = FakeLauncher::new();
        launcher.starts(&connector);
        let manager = manager_with(connector.clone(), launcher.clone(), ClientConfig::default());

        let start = Instant::now();
        manager.connect().await.unwrap();
        assert!(start.elapsed() >= ms(1000));
        assert_eq!(connector.attempts(), 2);
        assert_eq!(launcher.launches(), 1);
        assert!(manager.owns_daemon());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_connects_spawn_once() {
        let (connector, _servers) = DuplexConnector::new(false);
        let launcher = FakeLauncher::new();
        launcher.starts(&connector);
        let manager = manager_with(connector.clone(), launcher.clone(), ClientConfig::default());

        let (a, b, c) = tokio::join!(manager.connect(), manager.connect(), manager.connect());
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(launcher.launches(), 1);
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_failure() {
        let (connector, _servers) = DuplexConnector::new(false);
        let launcher = FakeLauncher::new();
        let manager = manager_with(connector.clone(), launcher.clone(), ClientConfig::default());

        let (a, b) = tokio::join!(manager.connect(), manager.connect());
        assert!(matches!(a, Err(ClientError::Connection { .. })));
        assert_eq!(a, b);
        assert_eq!(launcher.launches(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_failure_is_fatal_for_connect() {
        let (connector, _servers) = DuplexConnector::new(false);
        let launcher = FakeLauncher::new();
        launcher.set_fail(true);
        let manager = manager_with(connector.clone(), launcher, ClientConfig::default());

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, ClientError::DaemonSpawn { .. }));
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_requests_rejected_on_close() {
        let (connector, mut servers) = DuplexConnector::new(true);
        let manager = manager_with(connector, FakeLauncher::new(), ClientConfig::default());
        manager.connect().await.unwrap();
        let mut daemon = servers.recv().await.unwrap();

        let first = tokio::spawn({
            let manager = manager.clone();
            async move { manager.request(ClientMessage::Ping).await }
        });
        let second = tokio::spawn({
            let manager = manager.clone();
            async move { manager.request(ClientMessage::List).await }
        });
        daemon.recv().await;
        daemon.recv().await;
        assert_eq!(manager.pending().len(), 2);

        drop(daemon);
        assert_eq!(first.await.unwrap(), Err(ClientError::ConnectionClosed));
        assert_eq!(second.await.unwrap(), Err(ClientError::ConnectionClosed));
        assert_eq!(manager.pending().len(), 0);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_backoff_schedule() {
        let (connector, mut servers) = DuplexConnector::new(true);
        let launcher = FakeLauncher::new();
        launcher.set_fail(true);
        let manager = manager_with(connector.clone(), launcher.clone(), ClientConfig::default());
        manager.connect().await.unwrap();
        let daemon = servers.recv().await.unwrap();

        connector.set_accepting(false);
        let closed_at = Instant::now();
        drop(daemon);

        tokio::time::sleep(Duration::from_secs(120)).await;
        let times = connector.attempt_times();
        assert_eq!(times.len(), 6, "initial connect plus five reconnects");

        let mut previous = closed_at;
        for (at, expected) in times[1..].iter().zip([2000u64, 4000, 8000, 10_000, 10_000]) {
            let gap = *at - previous;
            assert!(
                gap >= ms(expected) && gap < ms(expected + 50),
                "expected ~{}ms, got {:?}",
                expected,
                gap
            );
            previous = *at;
        }
        assert_eq!(launcher.launches(), 5);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_reconnect_waits_two_seconds() {
        let (connector, mut servers) = DuplexConnector::new(true);
        let manager = manager_with(connector.clone(), FakeLauncher::new(), ClientConfig::default());
        manager.connect().await.unwrap();
        drop(servers.recv().await.unwrap());

        tokio::time::sleep(ms(1999)).await;
        assert_eq!(connector.attempts(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        let _daemon = servers.recv().await.unwrap();
        assert_eq!(connector.attempts(), 2);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_connect_after_exhaustion_starts_fresh_sequence() {
        let (connector, mut servers) = DuplexConnector::new(true);
        let launcher = FakeLauncher::new();
        launcher.set_fail(true);
        let manager = manager_with(connector.clone(), launcher, ClientConfig::default());
        manager.connect().await.unwrap();
        connector.set_accepting(false);
        drop(servers.recv().await.unwrap());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.attempts(), 6);

        connector.set_accepting(true);
        manager.connect().await.unwrap();
        let daemon = servers.recv().await.unwrap();
        connector.set_accepting(false);
        let closed_at = Instant::now();
        drop(daemon);

        tokio::time::sleep(ms(2100)).await;
        let times = connector.attempt_times();
        assert_eq!(times.len(), 8);
        let gap = times[7] - closed_at;
        assert!(gap >= ms(2000) && gap < ms(2050), "got {:?}", gap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriptions_reannounced_after_reconnect() {
        let (connector, mut servers) = DuplexConnector::new(true);
        let manager = manager_with(connector, FakeLauncher::new(), ClientConfig::default());
        manager.connect().await.unwrap();
        let mut first = servers.recv().await.unwrap();

        let (tx, _rx) = mpsc::unbounded_channel::<SessionEvent>();
        manager.subscriptions().insert("s1", Arc::new(tx));
        manager.send_one_way(ClientMessage::Subscribe {
            id: "s1".to_string(),
        });
        assert_eq!(
            first.recv().await.message,
            ClientMessage::Subscribe {
                id: "s1".to_string()
            }
        );

        drop(first);
        let mut second = servers.recv().await.unwrap();
        let announced = second.recv().await;
        assert_eq!(
            announced.message,
            ClientMessage::Subscribe {
                id: "s1".to_string()
            }
        );
        assert!(announced.request_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_does_not_reconnect() {
        let (connector, mut servers) = DuplexConnector::new(true);
        let manager = manager_with(connector.clone(), FakeLauncher::new(), ClientConfig::default());
        manager.connect().await.unwrap();
        let _daemon = servers.recv().await.unwrap();

        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 1);

        manager.connect().await.unwrap();
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_way_without_connection_is_noop() {
        let (connector, _servers) = DuplexConnector::new(true);
        let manager = manager_with(connector.clone(), FakeLauncher::new(), ClientConfig::default());
        assert!(!manager.send_one_way(ClientMessage::Kill {
            id: "s1".to_string()
        }));
        assert_eq!(connector.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_first_attempt_skips_spawn() {
        let (connector, _servers) = DuplexConnector::new(false);
        connector.set_delay(ms(2000));
        let launcher = FakeLauncher::new();
        let manager = manager_with(connector.clone(), launcher.clone(), ClientConfig::default());

        let connecting = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect().await }
        });
        tokio::time::sleep(ms(500)).await;
        assert!(manager.shutdown().await.is_none());

        assert_eq!(connecting.await.unwrap(), Err(ClientError::ShuttingDown));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(launcher.launches(), 0);
        assert_eq!(connector.attempts(), 1);
        assert!(!manager.owns_daemon());
        assert_eq!(manager.state(), ConnectionState::ShuttingDown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_warmup_stops_spawned_daemon() {
        let (connector, _servers) = DuplexConnector::new(false);
        let launcher = FakeLauncher::new();
        let manager = manager_with(connector.clone(), launcher.clone(), ClientConfig::default());

        let connecting = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect().await }
        });
        tokio::time::sleep(ms(500)).await;
        assert_eq!(launcher.launches(), 1);

        manager.shutdown().await;
        assert_eq!(connecting.await.unwrap(), Err(ClientError::ShuttingDown));
        assert_eq!(launcher.graceful_signals(), 1);
        assert!(!manager.owns_daemon());
        assert_eq!(connector.attempts(), 1, "no retry after shutdown");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_refuses_requests() {
        let (connector, mut servers) = DuplexConnector::new(true);
        let manager = manager_with(connector.clone(), FakeLauncher::new(), ClientConfig::default());
        manager.connect().await.unwrap();
        let _daemon = servers.recv().await.unwrap();

        assert!(manager.shutdown().await.is_none());
        assert_eq!(manager.state(), ConnectionState::ShuttingDown);
        assert_eq!(
            manager.request(ClientMessage::Ping).await,
            Err(ClientError::ShuttingDown)
        );
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 1);
    }
}
