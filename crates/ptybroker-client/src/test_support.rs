//! In-memory daemon and launcher doubles for unit tests.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use futures::future::BoxFuture;
use ptybroker_protocol::{ClientMessage, JsonLineCodec, Outbound};
use ptybroker_reaper::{ExitObservation, Terminate, TerminateError};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::codec::FramedRead;

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionSettings};
use crate::errors::SupervisorError;
use crate::supervisor::{DaemonLauncher, Supervisor};
use crate::transport::{Connector, Transport};

/// Connector backed by `tokio::io::duplex`. Every accepted connection hands
/// its daemon end to the test through the receiver returned by `new`.
pub(crate) struct DuplexConnector {
    accepting: AtomicBool,
    delay: Mutex<Duration>,
    attempts: Mutex<Vec<Instant>>,
    servers: mpsc::UnboundedSender<FakeDaemon>,
}

impl DuplexConnector {
    pub fn new(accepting: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<FakeDaemon>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accepting: AtomicBool::new(accepting),
            delay: Mutex::new(Duration::ZERO),
            attempts: Mutex::new(Vec::new()),
            servers: tx,
        });
        (connector, rx)
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Every attempt takes `delay` before it is accepted or refused.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Connector for DuplexConnector {
    fn connect(&self) -> BoxFuture<'_, io::Result<Transport>> {
        Box::pin(async move {
            self.attempts.lock().unwrap().push(Instant::now());
            let delay = *self.delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if !self.accepting.load(Ordering::SeqCst) {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "no daemon listening",
                ));
            }
            let (client, server) = tokio::io::duplex(64 * 1024);
            let _ = self.servers.send(FakeDaemon::new(server));
            Ok(Transport::from_stream(client))
        })
    }

    fn describe(&self) -> String {
        "duplex://test".to_string()
    }
}

/// The daemon's end of one in-memory connection.
pub(crate) struct FakeDaemon {
    reader: FramedRead<ReadHalf<DuplexStream>, JsonLineCodec<Outbound>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeDaemon {
    fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: FramedRead::new(reader, JsonLineCodec::new()),
            writer,
        }
    }

    /// Next message from the client. Panics if the client hung up.
    pub async fn recv(&mut self) -> Outbound {
        self.reader
            .next()
            .await
            .expect("client closed the connection")
            .expect("client sent an unreadable frame")
    }

    /// Write one raw line (a newline is appended).
    pub async fn send_line(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .unwrap();
    }

    /// Answer requests with canned replies until the client hangs up.
    ///
    /// `create` yields `s1`, `s2`, ...; `list` is empty; `getBuffer` is an
    /// empty live buffer. One-way commands are forwarded to the returned
    /// receiver along with everything else.
    pub fn serve(mut self) -> mpsc::UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut created = 0;
            while let Some(Ok(message)) = self.reader.next().await {
                if let Some(request_id) = &message.request_id {
                    let reply = match &message.message {
                        ClientMessage::Create { .. } => {
                            created += 1;
                            serde_json::json!({"type": "created", "requestId": request_id, "id": format!("s{}", created)})
                        }
                        ClientMessage::List => {
                            serde_json::json!({"type": "list", "requestId": request_id, "data": []})
                        }
                        ClientMessage::GetBuffer { .. } => serde_json::json!({
                            "type": "buffer",
                            "requestId": request_id,
                            "data": {"buffer": "", "isDead": false}
                        }),
                        _ => serde_json::json!({"type": "pong", "requestId": request_id}),
                    };
                    self.send_line(&reply.to_string()).await;
                }
                let _ = tx.send(message);
            }
        });
        rx
    }
}

/// Launcher double. Counts launches and hands out [`FakeDaemonProcess`] targets.
#[derive(Default)]
pub(crate) struct FakeLauncher {
    launches: AtomicUsize,
    fail: AtomicBool,
    ignores_sigterm: AtomicBool,
    graceful: Arc<AtomicUsize>,
    force: Arc<AtomicUsize>,
    starts: Mutex<Option<Arc<DuplexConnector>>>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Launching makes `connector` start accepting, like a real daemon
    /// binding its socket.
    pub fn starts(&self, connector: &Arc<DuplexConnector>) {
        *self.starts.lock().unwrap() = Some(Arc::clone(connector));
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_ignores_sigterm(&self, ignores: bool) {
        self.ignores_sigterm.store(ignores, Ordering::SeqCst);
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn graceful_signals(&self) -> usize {
        self.graceful.load(Ordering::SeqCst)
    }

    pub fn force_kills(&self) -> usize {
        self.force.load(Ordering::SeqCst)
    }
}

impl DaemonLauncher for FakeLauncher {
    fn launch(&self) -> Result<Box<dyn Terminate>, SupervisorError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SupervisorError::SpawnFailed {
                binary: "fake-daemon".to_string(),
                message: "launch refused by test".to_string(),
            });
        }
        if let Some(connector) = self.starts.lock().unwrap().as_ref() {
            connector.set_accepting(true);
        }
        Ok(Box::new(FakeDaemonProcess {
            graceful: Arc::clone(&self.graceful),
            force: Arc::clone(&self.force),
            ignores_sigterm: self.ignores_sigterm.load(Ordering::SeqCst),
            terminated: false,
        }))
    }
}

/// Exits as soon as it is signalled, unless told to ignore SIGTERM.
pub(crate) struct FakeDaemonProcess {
    graceful: Arc<AtomicUsize>,
    force: Arc<AtomicUsize>,
    ignores_sigterm: bool,
    terminated: bool,
}

impl Terminate for FakeDaemonProcess {
    fn pid(&self) -> Option<u32> {
        Some(7777)
    }

    fn signal_graceful(&mut self) -> Result<(), TerminateError> {
        self.graceful.fetch_add(1, Ordering::SeqCst);
        self.terminated = !self.ignores_sigterm;
        Ok(())
    }

    fn force_kill(&mut self) -> Result<(), TerminateError> {
        self.force.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wait_exit(&mut self) -> Option<BoxFuture<'_, ExitObservation>> {
        let terminated = self.terminated;
        Some(Box::pin(async move {
            if terminated {
                ExitObservation::Exited(Some(0))
            } else {
                futures::future::pending().await
            }
        }))
    }
}

pub(crate) fn manager_with(
    connector: Arc<DuplexConnector>,
    launcher: Arc<FakeLauncher>,
    config: ClientConfig,
) -> Arc<ConnectionManager> {
    let supervisor = Supervisor::new(launcher, Duration::from_millis(config.kill_timeout_ms));
    ConnectionManager::new(connector, supervisor, ConnectionSettings::from(&config))
}
