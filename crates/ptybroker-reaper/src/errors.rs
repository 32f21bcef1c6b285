/// Failure of a single termination step.
///
/// These are logged by the terminator and never propagated: the target is,
/// by definition, a process that may already be gone or wedged.
#[derive(Debug, thiserror::Error)]
pub enum TerminateError {
    #[error("process has no pid (already reaped)")]
    NoPid,

    #[error("failed to send {signal} to pid {pid}: {message}")]
    Signal {
        signal: &'static str,
        pid: u32,
        message: String,
    },

    #[error("failed to kill pid {pid}: {message}")]
    Kill { pid: u32, message: String },

    #[error("failed to launch '{command}' for pid {pid}: {message}")]
    TreeKill {
        command: String,
        pid: u32,
        message: String,
    },
}

impl TerminateError {
    pub fn error_code(&self) -> &'static str {
        match self {
            TerminateError::NoPid => "TERMINATE_NO_PID",
            TerminateError::Signal { .. } => "TERMINATE_SIGNAL_FAILED",
            TerminateError::Kill { .. } => "TERMINATE_KILL_FAILED",
            TerminateError::TreeKill { .. } => "TERMINATE_TREE_KILL_FAILED",
        }
    }
}
