/// Lifecycle state of a timer.
///
/// ```text
/// IDLE ──start──▶ RUNNING ──trigger──▶ EXECUTING ──▶ COMPLETED
///   │               │  ▲
///   └────cancel─────┴──┼──▶ CANCELLED
///                      └──── reschedule / start ────┘
/// ```
pub mod timer {
    /// Set if the run loop has never been started.
    pub const IDLE: usize = 1 << 1;

    /// Set if the run loop is live and waiting for a signal.
    pub const RUNNING: usize = 1 << 2;

    /// Set if the routine is being executed.
    pub const EXECUTING: usize = 1 << 3;

    /// Set if the routine has been executed. Terminal.
    pub const COMPLETED: usize = 1 << 4;

    /// Set if the run loop has been Cancelled before firing.
    pub const CANCELLED: usize = 1 << 5;

    /// States in which the routine has been taken, scheduling is inert.
    pub(crate) const SPENT: usize = EXECUTING | COMPLETED;

    /// States from which a run loop may be launched.
    pub(crate) const LAUNCHABLE: usize = IDLE | CANCELLED;
}
