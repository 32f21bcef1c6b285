//! Graceful-then-forceful termination of child processes.
//!
//! [`terminate`] sends the graceful signal immediately and arms exactly one
//! escalation timer. The forceful kill fires once after the timeout unless
//! the process exits first. The escalation runs as a detached tokio task, so
//! it never keeps the host process alive on its own.

mod child;
mod errors;
mod terminator;

#[cfg(windows)]
pub use child::DETACHED_PROCESS;
pub use child::{ChildTarget, tree_kill_command};
pub use errors::TerminateError;
pub use terminator::{
    DEFAULT_KILL_TIMEOUT, ExitObservation, Terminate, TerminationHandle, TerminationOutcome,
    terminate, terminate_and_wait,
};
