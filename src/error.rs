//! Public error of reschedule-timer.

use crate::prelude::*;

/// Error enumeration for `RescheduleTimer`-related operations.
#[derive(Error, Debug)]
pub enum TimerError {
    /// The run loop of the timer is live, it can't be started twice.
    #[error("The run loop of the timer is already running.")]
    AlreadyRunning,
    /// The routine of the timer was executed, the timer can't be started again.
    #[error("The routine of the timer has already fired.")]
    AlreadyFired,
    /// `tokio_runtime_by_current` was requested outside of a tokio runtime.
    #[error("No tokio runtime is reachable from the current context.")]
    MissingTokioRuntime(#[from] tokio::runtime::TryCurrentError),
    /// The internal tokio runtime of `tokio_runtime_by_default` could not be built.
    #[error("The internal tokio runtime failed to build.")]
    TokioRuntimeBuild(#[from] std::io::Error),
    /// The routine panicked while running; delivered to the outcome handler.
    #[error("The routine of the timer panicked.")]
    RoutinePanicked,
    /// The blocking pool of tokio lost the routine before it finished.
    #[error("The routine of the timer was aborted by the runtime.")]
    RoutineAborted(#[from] tokio::task::JoinError),
    /// Internal channel communication abnormality.
    #[error("Status report channel exception.")]
    StatusReportChannel(#[from] channel::TryRecvError),
    /// The timer was built without `enable_status_report`.
    #[error("Status report is not enabled for this timer.")]
    StatusReportDisabled,
}
