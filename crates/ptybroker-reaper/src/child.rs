use futures::future::BoxFuture;
use tokio::process::Child;
use tracing::debug;

use crate::errors::TerminateError;
use crate::terminator::{ExitObservation, Terminate};

/// A spawned child process as a termination target.
///
/// POSIX: SIGTERM, then SIGKILL. Windows has no graceful signal, so the
/// first phase is a plain kill and the second kills the whole process tree.
#[derive(Debug)]
pub struct ChildTarget {
    child: Child,
}

impl ChildTarget {
    pub fn new(child: Child) -> Self {
        Self { child }
    }

    pub fn into_inner(self) -> Child {
        self.child
    }

    fn require_pid(&self) -> Result<u32, TerminateError> {
        self.child.id().ok_or(TerminateError::NoPid)
    }
}

impl From<Child> for ChildTarget {
    fn from(child: Child) -> Self {
        Self::new(child)
    }
}

impl Terminate for ChildTarget {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    #[cfg(unix)]
    fn signal_graceful(&mut self) -> Result<(), TerminateError> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let pid = self.require_pid()?;
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| TerminateError::Signal {
            signal: "SIGTERM",
            pid,
            message: e.to_string(),
        })?;
        debug!(event = "reaper.child.sigterm_sent", pid = pid);
        Ok(())
    }

    #[cfg(not(unix))]
    fn signal_graceful(&mut self) -> Result<(), TerminateError> {
        let pid = self.require_pid()?;
        self.child
            .start_kill()
            .map_err(|e| TerminateError::Kill {
                pid,
                message: e.to_string(),
            })?;
        debug!(event = "reaper.child.kill_sent", pid = pid);
        Ok(())
    }

    #[cfg(unix)]
    fn force_kill(&mut self) -> Result<(), TerminateError> {
        let pid = self.require_pid()?;
        // SIGKILL on unix.
        self.child.start_kill().map_err(|e| TerminateError::Kill {
            pid,
            message: e.to_string(),
        })
    }

    #[cfg(not(unix))]
    fn force_kill(&mut self) -> Result<(), TerminateError> {
        let pid = self.require_pid()?;
        spawn_tree_kill(pid)
    }

    fn wait_exit(&mut self) -> Option<BoxFuture<'_, ExitObservation>> {
        Some(Box::pin(async move {
            match self.child.wait().await {
                Ok(status) => ExitObservation::Exited(status.code()),
                Err(e) => ExitObservation::Errored(e.to_string()),
            }
        }))
    }
}

/// Command line that kills `pid` and all of its descendants on Windows.
pub fn tree_kill_command(pid: u32) -> (&'static str, Vec<String>) {
    (
        "taskkill",
        vec![
            "/pid".to_string(),
            pid.to_string(),
            "/f".to_string(),
            "/t".to_string(),
        ],
    )
}

/// Windows `DETACHED_PROCESS` creation flag: no console is inherited.
#[cfg(windows)]
pub const DETACHED_PROCESS: u32 = 0x0000_0008;

/// The tree kill as a detached process with discarded stdio.
#[cfg_attr(unix, allow(dead_code))]
fn tree_kill_process(pid: u32) -> std::process::Command {
    let (program, args) = tree_kill_command(pid);
    let mut command = std::process::Command::new(program);
    command
        .args(&args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(DETACHED_PROCESS);
    }
    command
}

/// Launch the tree kill without waiting for it.
#[cfg_attr(unix, allow(dead_code))]
fn spawn_tree_kill(pid: u32) -> Result<(), TerminateError> {
    let (program, args) = tree_kill_command(pid);
    tree_kill_process(pid)
        .spawn()
        .map(|_| ())
        .map_err(|e| TerminateError::TreeKill {
            command: format!("{} {}", program, args.join(" ")),
            pid,
            message: e.to_string(),
        })
}
