use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::TerminateError;

/// Default grace period between the graceful signal and the forceful kill.
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_millis(5000);

/// What the exit watcher saw before the escalation timer fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitObservation {
    Exited(Option<i32>),
    Errored(String),
}

/// A process that can be terminated in two phases.
///
/// Implementations pick the platform behaviour: SIGTERM then SIGKILL on
/// POSIX, a signal-less kill then a tree kill on Windows.
pub trait Terminate: Send + 'static {
    fn pid(&self) -> Option<u32>;

    fn signal_graceful(&mut self) -> Result<(), TerminateError>;

    fn force_kill(&mut self) -> Result<(), TerminateError>;

    /// Resolves when the process exits or its exit can no longer be observed.
    ///
    /// `None` means the target cannot report exit at all; escalation then
    /// always fires after the timeout.
    fn wait_exit(&mut self) -> Option<BoxFuture<'_, ExitObservation>>;
}

impl<T: Terminate + ?Sized> Terminate for Box<T> {
    fn pid(&self) -> Option<u32> {
        (**self).pid()
    }

    fn signal_graceful(&mut self) -> Result<(), TerminateError> {
        (**self).signal_graceful()
    }

    fn force_kill(&mut self) -> Result<(), TerminateError> {
        (**self).force_kill()
    }

    fn wait_exit(&mut self) -> Option<BoxFuture<'_, ExitObservation>> {
        (**self).wait_exit()
    }
}

/// Final state of one termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// Exited before the timeout; no forceful kill was sent.
    Exited { code: Option<i32> },
    /// The exit watcher reported an error before the timeout; escalation was cancelled.
    Errored { message: String },
    ForceKilled,
    ForceKillFailed { message: String },
    /// The escalation task was cancelled or panicked.
    Aborted,
}

/// Handle to a running termination.
///
/// Dropping the handle does not cancel escalation; the task keeps running
/// on the runtime and never holds the runtime open at shutdown.
#[derive(Debug)]
pub struct TerminationHandle {
    pid: Option<u32>,
    task: JoinHandle<TerminationOutcome>,
}

impl TerminationHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the termination to settle.
    pub async fn outcome(self) -> TerminationOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(event = "reaper.escalation_task_failed", pid = ?self.pid, error = %e);
                TerminationOutcome::Aborted
            }
        }
    }
}

/// Terminate `target`: graceful signal now, forceful kill after `timeout`
/// unless the process exits (or its watcher errors) first.
///
/// The graceful signal is sent synchronously before this returns. Its
/// failure is logged and does not stop the escalation from being armed.
/// Must be called from within a tokio runtime.
pub fn terminate<T: Terminate>(mut target: T, timeout: Duration) -> TerminationHandle {
    let pid = target.pid();
    info!(
        event = "reaper.terminate_started",
        pid = ?pid,
        timeout_ms = timeout.as_millis() as u64,
    );

    if let Err(e) = target.signal_graceful() {
        warn!(
            event = "reaper.graceful_signal_failed",
            pid = ?pid,
            error = %e,
            error_code = e.error_code(),
        );
    }

    let task = tokio::spawn(escalate(target, pid, timeout));
    TerminationHandle { pid, task }
}

async fn escalate<T: Terminate>(
    mut target: T,
    pid: Option<u32>,
    timeout: Duration,
) -> TerminationOutcome {
    let observed = match target.wait_exit() {
        Some(exit) => {
            tokio::select! {
                observation = exit => Some(observation),
                _ = tokio::time::sleep(timeout) => None,
            }
        }
        None => {
            warn!(
                event = "reaper.exit_unobservable",
                pid = ?pid,
                "Target cannot report exit; forceful kill will be sent after the timeout.",
            );
            tokio::time::sleep(timeout).await;
            None
        }
    };

    match observed {
        Some(ExitObservation::Exited(code)) => {
            info!(event = "reaper.terminate_completed", pid = ?pid, exit_code = ?code);
            TerminationOutcome::Exited { code }
        }
        Some(ExitObservation::Errored(message)) => {
            warn!(event = "reaper.exit_watch_failed", pid = ?pid, error = %message);
            TerminationOutcome::Errored { message }
        }
        None => {
            warn!(event = "reaper.escalation_fired", pid = ?pid);
            match target.force_kill() {
                Ok(()) => {
                    info!(event = "reaper.force_kill_completed", pid = ?pid);
                    TerminationOutcome::ForceKilled
                }
                Err(e) => {
                    error!(
                        event = "reaper.force_kill_failed",
                        pid = ?pid,
                        error = %e,
                        error_code = e.error_code(),
                    );
                    TerminationOutcome::ForceKillFailed {
                        message: e.to_string(),
                    }
                }
            }
        }
    }
}

/// Terminate `target` and wait for the outcome.
pub async fn terminate_and_wait<T: Terminate>(
    target: T,
    timeout: Duration,
) -> TerminationOutcome {
    let handle = terminate(target, timeout);
    let outcome = handle.outcome().await;
    debug!(event = "reaper.terminate_settled", outcome = ?outcome);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Graceful,
        Force,
    }

    /// Scripted target. `exit_rx` resolves the exit watcher when the test
    /// sends on the paired sender; dropping the sender never resolves it.
    struct FakeTarget {
        calls: Arc<Mutex<Vec<Call>>>,
        graceful_fails: bool,
        observable: bool,
        exit_rx: Option<oneshot::Receiver<ExitObservation>>,
    }

    impl FakeTarget {
        fn new() -> (Self, oneshot::Sender<ExitObservation>, Arc<Mutex<Vec<Call>>>) {
            let (tx, rx) = oneshot::channel();
            let calls = Arc::new(Mutex::new(Vec::new()));
            let target = Self {
                calls: calls.clone(),
                graceful_fails: false,
                observable: true,
                exit_rx: Some(rx),
            };
            (target, tx, calls)
        }
    }

    impl Terminate for FakeTarget {
        fn pid(&self) -> Option<u32> {
            Some(4242)
        }

        fn signal_graceful(&mut self) -> Result<(), TerminateError> {
            self.calls.lock().unwrap().push(Call::Graceful);
            if self.graceful_fails {
                return Err(TerminateError::Kill {
                    pid: 4242,
                    message: "process already gone".to_string(),
                });
            }
            Ok(())
        }

        fn force_kill(&mut self) -> Result<(), TerminateError> {
            self.calls.lock().unwrap().push(Call::Force);
            Ok(())
        }

        fn wait_exit(&mut self) -> Option<BoxFuture<'_, ExitObservation>> {
            if !self.observable {
                return None;
            }
            let rx = self.exit_rx.take()?;
            Some(Box::pin(async move {
                match rx.await {
                    Ok(observation) => observation,
                    Err(_) => futures::future::pending().await,
                }
            }))
        }
    }

    fn count(calls: &Arc<Mutex<Vec<Call>>>, call: Call) -> usize {
        calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_signal_sent_immediately() {
        let (target, _exit_tx, calls) = FakeTarget::new();
        let handle = terminate(target, Duration::from_millis(5000));
        assert_eq!(*calls.lock().unwrap(), vec![Call::Graceful]);
        assert_eq!(handle.pid(), Some(4242));
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_kill_once_after_timeout() {
        let (target, _exit_tx, calls) = FakeTarget::new();
        let handle = terminate(target, Duration::from_millis(5000));

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert_eq!(count(&calls, Call::Force), 0);

        let outcome = handle.outcome().await;
        assert_eq!(outcome, TerminationOutcome::ForceKilled);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count(&calls, Call::Force), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_before_timeout_cancels_escalation() {
        let (target, exit_tx, calls) = FakeTarget::new();
        let handle = terminate(target, Duration::from_millis(5000));

        tokio::time::sleep(Duration::from_millis(100)).await;
        exit_tx.send(ExitObservation::Exited(Some(0))).unwrap();

        let outcome = handle.outcome().await;
        assert_eq!(outcome, TerminationOutcome::Exited { code: Some(0) });
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count(&calls, Call::Force), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_error_cancels_escalation() {
        let (target, exit_tx, calls) = FakeTarget::new();
        let handle = terminate(target, Duration::from_millis(5000));
        exit_tx
            .send(ExitObservation::Errored("wait failed".to_string()))
            .unwrap();

        let outcome = handle.outcome().await;
        assert!(matches!(outcome, TerminationOutcome::Errored { .. }));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count(&calls, Call::Force), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_failure_still_escalates() {
        let (mut target, _exit_tx, calls) = FakeTarget::new();
        target.graceful_fails = true;
        let handle = terminate(target, Duration::from_millis(200));

        let outcome = handle.outcome().await;
        assert_eq!(outcome, TerminationOutcome::ForceKilled);
        assert_eq!(*calls.lock().unwrap(), vec![Call::Graceful, Call::Force]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unobservable_target_still_escalates() {
        let (mut target, _exit_tx, calls) = FakeTarget::new();
        target.observable = false;
        let handle = terminate(target, Duration::from_millis(1000));

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(count(&calls, Call::Force), 0);
        assert_eq!(handle.outcome().await, TerminationOutcome::ForceKilled);
        assert_eq!(count(&calls, Call::Force), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_keeps_escalating() {
        let (target, _exit_tx, calls) = FakeTarget::new();
        drop(terminate(target, Duration::from_millis(300)));

        tokio::time::sleep(Duration::from_millis(301)).await;
        tokio::task::yield_now().await;
        assert_eq!(count(&calls, Call::Force), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_and_wait_reports_exit() {
        let (target, exit_tx, _calls) = FakeTarget::new();
        exit_tx.send(ExitObservation::Exited(Some(143))).unwrap();
        let outcome = terminate_and_wait(target, DEFAULT_KILL_TIMEOUT).await;
        assert_eq!(outcome, TerminationOutcome::Exited { code: Some(143) });
    }

    #[tokio::test(start_paused = true)]
    async fn test_boxed_target_escalates() {
        let (target, _exit_tx, calls) = FakeTarget::new();
        let boxed: Box<dyn Terminate> = Box::new(target);
        let outcome = terminate_and_wait(boxed, Duration::from_millis(50)).await;
        assert_eq!(outcome, TerminationOutcome::ForceKilled);
        assert_eq!(*calls.lock().unwrap(), vec![Call::Graceful, Call::Force]);
    }
}
