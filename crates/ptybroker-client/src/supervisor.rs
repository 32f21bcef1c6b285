use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[cfg(windows)]
use ptybroker_reaper::DETACHED_PROCESS;
use ptybroker_reaper::{ChildTarget, Terminate, TerminationHandle, TerminationOutcome, terminate};
use tracing::{error, info, warn};

use crate::config::resolve_daemon_binary;
use crate::errors::SupervisorError;

/// Starts the daemon process.
///
/// The returned target is what [`crate::BrokerClient::shutdown`] terminates
/// when this client was the one that started the daemon.
pub trait DaemonLauncher: Send + Sync + 'static {
    fn launch(&self) -> Result<Box<dyn Terminate>, SupervisorError>;
}

/// Launches the daemon executable detached from this process.
///
/// The child gets its own process group (POSIX) or a detached console and
/// process group (Windows), and all of its stdio is discarded, so it
/// outlives the client.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    binary: Option<PathBuf>,
}

impl ProcessLauncher {
    /// `binary` overrides the default lookup; see [`crate::ClientConfig::daemon_binary`].
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self { binary }
    }
}

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

impl DaemonLauncher for ProcessLauncher {
    fn launch(&self) -> Result<Box<dyn Terminate>, SupervisorError> {
        let binary = resolve_daemon_binary(self.binary.as_deref())?;

        let mut command = tokio::process::Command::new(&binary);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);
        #[cfg(unix)]
        command.process_group(0);
        #[cfg(windows)]
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);

        let child = command.spawn().map_err(|e| SupervisorError::SpawnFailed {
            binary: binary.display().to_string(),
            message: e.to_string(),
        })?;
        info!(
            event = "client.supervisor.daemon_launched",
            binary = %binary.display(),
            pid = ?child.id(),
        );
        Ok(Box::new(ChildTarget::new(child)))
    }
}

/// Tracks every daemon this client started.
///
/// A reconnect may spawn again while an earlier daemon is still alive but
/// unreachable; all of them are terminated on shutdown.
pub(crate) struct Supervisor {
    launcher: Arc<dyn DaemonLauncher>,
    spawned: Mutex<Vec<Box<dyn Terminate>>>,
    kill_timeout: Duration,
}

impl Supervisor {
    pub fn new(launcher: Arc<dyn DaemonLauncher>, kill_timeout: Duration) -> Self {
        Self {
            launcher,
            spawned: Mutex::new(Vec::new()),
            kill_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Box<dyn Terminate>>> {
        self.spawned.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn spawn_daemon(&self) -> Result<(), SupervisorError> {
        info!(event = "client.supervisor.spawn_started");
        let target = self.launcher.launch().inspect_err(|e| {
            error!(event = "client.supervisor.spawn_failed", error = %e);
        })?;
        let pid = target.pid();
        let count = {
            let mut spawned = self.lock();
            spawned.push(target);
            spawned.len()
        };
        if count > 1 {
            warn!(
                event = "client.supervisor.daemon_respawned",
                pid = ?pid,
                tracked = count,
            );
        }
        info!(event = "client.supervisor.spawn_completed", pid = ?pid);
        Ok(())
    }

    pub fn owns_daemon(&self) -> bool {
        !self.lock().is_empty()
    }

    /// Gracefully terminate every daemon this client spawned.
    ///
    /// Returns the outcome for the most recent one, `None` if this client
    /// never spawned a daemon.
    pub async fn shutdown(&self) -> Option<TerminationOutcome> {
        let targets = std::mem::take(&mut *self.lock());
        if targets.is_empty() {
            return None;
        }
        // Signal all of them before waiting on any.
        let handles: Vec<TerminationHandle> = targets
            .into_iter()
            .map(|target| {
                info!(event = "client.supervisor.daemon_stop_started", pid = ?target.pid());
                terminate(target, self.kill_timeout)
            })
            .collect();

        let mut latest = None;
        for handle in handles {
            let pid = handle.pid();
            let outcome = handle.outcome().await;
            info!(
                event = "client.supervisor.daemon_stop_completed",
                pid = ?pid,
                outcome = ?outcome,
            );
            latest = Some(outcome);
        }
        latest
    }
}
