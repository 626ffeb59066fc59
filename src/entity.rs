//! RescheduleTimer fires one routine, once, at a deadline that may be moved
//! any number of times before it elapses.
//!
//! # RescheduleTimer
//!
//! User applications drive it through a handful of operations:
//!
//! 1. `until` / `after` / `add` move the deadline; deadlines within the tolerance
//!    of the armed one are coalesced into the existing alarm.
//! 2. `do_immediately` fires now, `cancel` stops the run loop before it fires.
//! 3. `is_done` / `get_time` / `get_state` observe it.

use super::timer::{
    task::{OutcomeHandler, Routine, SharedOutcomeHandler},
    timer_core::{Termination, TimerCore, DEFAULT_TOLERANCE},
};
use crate::prelude::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use once_cell::sync::{Lazy, OnceCell};
use snowflake::SnowflakeIdGenerator;
use tokio::runtime::{Builder as TokioBuilder, Runtime};

cfg_status_report!(
    use crate::utils::status_report::StatusReporter;
);

// Global IdGenerator.
static ID_GENERATOR: Lazy<Mutex<SnowflakeIdGenerator>> =
    Lazy::new(|| Mutex::new(SnowflakeIdGenerator::new(1, 1)));

// Runtime shared by every timer built with `tokio_runtime_by_default`.
static GLOBAL_TOKIO_RUNTIME: OnceCell<Runtime> = OnceCell::new();

pub(crate) fn next_timer_id() -> i64 {
    ID_GENERATOR
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .real_time_generate()
}

/// Builds RescheduleTimer with custom configuration values.
///
/// Methods can be chained in order to set the configuration values. The
/// timer is constructed by calling one of the `spawn_*` (run loop started)
/// or `build_*` (caller starts it) methods.
///
/// # Examples
///
/// ```
/// use reschedule_timer::prelude::*;
/// use std::time::Duration;
///
/// let timer = RescheduleTimerBuilder::default()
///     .set_tolerance(Duration::from_millis(200))
///     .set_outcome_handler(|outcome: AnyResult<()>| {
///         if let Err(e) = outcome {
///             eprintln!("flush failed: {}", e);
///         }
///     })
///     .spawn_routine(|| Ok(()))
///     .unwrap();
///
/// timer.after(Duration::from_secs(3));
/// assert!(!timer.is_done());
/// ```
#[derive(Clone, Default)]
pub struct RescheduleTimerBuilder {
    tolerance: Option<Duration>,
    outcome_handler: Option<SharedOutcomeHandler>,
    runtime_kind: RuntimeKind,
    tokio_handle: Option<TokioHandle>,
    use_current_tokio_runtime: bool,
    /// Whether or not to enable the status-report
    #[cfg(feature = "status-report")]
    enable_status_report: bool,
}

impl fmt::Debug for RescheduleTimerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RescheduleTimerBuilder")
            .field("tolerance", &self.get_tolerance())
            .field("outcome_handler", &self.outcome_handler.is_some())
            .field("runtime_kind", &self.runtime_kind)
            .field("use_current_tokio_runtime", &self.use_current_tokio_runtime)
            .finish()
    }
}

/// A single-task timer whose deadline can be rescheduled until it fires.
///
/// Cloning is cheap, every clone drives the same timer.
///
/// Dropping the last clone leaves a pending deadline to fire, but stops a
/// run loop that has nothing left to wait for.
pub struct RescheduleTimer {
    core: Arc<TimerCore>,
    #[cfg(feature = "status-report")]
    status_reporter: Option<StatusReporter>,
}

impl Clone for RescheduleTimer {
    fn clone(&self) -> Self {
        self.core.handles.fetch_add(1, Ordering::Relaxed);

        RescheduleTimer {
            core: self.core.clone(),
            #[cfg(feature = "status-report")]
            status_reporter: self.status_reporter.clone(),
        }
    }
}

impl Drop for RescheduleTimer {
    fn drop(&mut self) {
        self.core.release_handle();
    }
}

impl fmt::Debug for RescheduleTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RescheduleTimer").field(&self.core).finish()
    }
}

// Only a handle is kept: a detached run loop may hold the last reference,
// and a tokio runtime can't be dropped from inside one of its workers.
#[derive(Clone, Debug, Default)]
pub(crate) struct RuntimeInstance {
    // smol have no instance.
    handle: Option<TokioHandle>,
    pub(crate) kind: RuntimeKind,
}

/// Async-Runtime Kind
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RuntimeKind {
    /// Async-Runtime `smol` compatible with the async-std
    Smol,

    /// Async-Runtime `tokio`
    Tokio,
}

impl Default for RuntimeKind {
    fn default() -> Self {
        RuntimeKind::Smol
    }
}

impl RuntimeInstance {
    pub(crate) fn by_tokio_handle(handle: TokioHandle) -> RuntimeInstance {
        RuntimeInstance {
            handle: Some(handle),
            kind: RuntimeKind::Tokio,
        }
    }

    pub(crate) fn tokio_handle(&self) -> Option<&TokioHandle> {
        self.handle.as_ref()
    }

    /// Spawn a background future that nobody joins.
    pub(crate) fn spawn_detached<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.tokio_handle() {
            Some(handle) if self.kind == RuntimeKind::Tokio => {
                handle.spawn(future);
            }
            _ => async_spawn_by_smol(future).detach(),
        }
    }

    fn global_tokio_handle() -> Result<TokioHandle, TimerError> {
        GLOBAL_TOKIO_RUNTIME
            .get_or_try_init(Self::tokio_support)
            .map(|rt| rt.handle().clone())
    }

    pub(crate) fn tokio_support() -> Result<Runtime, TimerError> {
        Ok(TokioBuilder::new_multi_thread()
            .enable_all()
            .thread_name_fn(|| {
                static ATOMIC_ID: AtomicUsize = AtomicUsize::new(0);
                let id = ATOMIC_ID.fetch_add(1, Ordering::SeqCst);
                format!("reschedule-timer-tokio-{}", id)
            })
            .on_thread_start(|| {
                info!("tokio-thread started");
            })
            .build()?)
    }
}

impl RescheduleTimerBuilder {
    /// Deadlines closer than `tolerance` to the armed one don't re-arm the alarm.
    ///
    /// The routine may fire up to `tolerance` away from the last requested deadline.
    /// Defaults to one second.
    pub fn set_tolerance(&mut self, tolerance: Duration) -> &mut Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Handler that receives the outcome of the routine. Defaults to a no-op.
    pub fn set_outcome_handler<H>(&mut self, outcome_handler: H) -> &mut Self
    where
        H: OutcomeHandler + 'static,
    {
        self.outcome_handler = Some(Arc::new(outcome_handler));
        self
    }

    /// With this API, `RescheduleTimer` uses the global executor of `smol`.
    ///
    /// This is the default, this API does not require a user-initiated call.
    pub fn smol_runtime_by_default(&mut self) -> &mut Self {
        self.runtime_kind = RuntimeKind::Smol;
        self.tokio_handle = None;
        self.use_current_tokio_runtime = false;
        self
    }

    /// With this API, `RescheduleTimer` uses a `TokioRuntime` generated internally
    /// and shared by every timer that asks for it.
    pub fn tokio_runtime_by_default(&mut self) -> &mut Self {
        self.runtime_kind = RuntimeKind::Tokio;
        self.tokio_handle = None;
        self.use_current_tokio_runtime = false;
        self
    }

    /// With this API, `RescheduleTimer` uses the tokio runtime it is built in.
    ///
    /// Building outside of a tokio runtime fails with `TimerError::MissingTokioRuntime`.
    pub fn tokio_runtime_by_current(&mut self) -> &mut Self {
        self.runtime_kind = RuntimeKind::Tokio;
        self.tokio_handle = None;
        self.use_current_tokio_runtime = true;
        self
    }

    /// With this api, `RescheduleTimer` internal will share a `TokioRuntime` with the user .
    ///
    /// The timer does not keep `rt` alive, once it shuts down pending alarms never fire.
    pub fn tokio_runtime_shared_by_custom(&mut self, rt: &Runtime) -> &mut Self {
        self.runtime_kind = RuntimeKind::Tokio;
        self.tokio_handle = Some(rt.handle().clone());
        self.use_current_tokio_runtime = false;
        self
    }

    /// Get the tolerance the built timers will use.
    pub fn get_tolerance(&self) -> Duration {
        self.tolerance.unwrap_or(DEFAULT_TOLERANCE)
    }

    /// Build a timer around a synchronous routine and start its run loop.
    pub fn spawn_routine<F>(&self, body: F) -> Result<RescheduleTimer, TimerError>
    where
        F: FnOnce() -> AnyResult<()> + 'static + Send,
    {
        self.init_reschedule_timer(Routine::new_sync(body), true)
    }

    /// Build a timer around an asynchronous routine and start its run loop.
    pub fn spawn_async_routine<F, U>(&self, body: F) -> Result<RescheduleTimer, TimerError>
    where
        F: FnOnce() -> U + 'static + Send,
        U: Future<Output = AnyResult<()>> + 'static + Send,
    {
        self.init_reschedule_timer(Routine::new_async(body), true)
    }

    /// Build a timer around a synchronous routine, the caller starts it
    /// with `start` or drives it with `run`.
    pub fn build_routine<F>(&self, body: F) -> Result<RescheduleTimer, TimerError>
    where
        F: FnOnce() -> AnyResult<()> + 'static + Send,
    {
        self.init_reschedule_timer(Routine::new_sync(body), false)
    }

    /// Build a timer around an asynchronous routine, the caller starts it
    /// with `start` or drives it with `run`.
    pub fn build_async_routine<F, U>(&self, body: F) -> Result<RescheduleTimer, TimerError>
    where
        F: FnOnce() -> U + 'static + Send,
        U: Future<Output = AnyResult<()>> + 'static + Send,
    {
        self.init_reschedule_timer(Routine::new_async(body), false)
    }

    fn init_runtime_instance(&self) -> Result<RuntimeInstance, TimerError> {
        Ok(match self.runtime_kind {
            RuntimeKind::Smol => RuntimeInstance::default(),
            RuntimeKind::Tokio => RuntimeInstance::by_tokio_handle(match self.tokio_handle {
                Some(ref handle) => handle.clone(),
                None if self.use_current_tokio_runtime => TokioHandle::try_current()?,
                None => RuntimeInstance::global_tokio_handle()?,
            }),
        })
    }

    fn init_reschedule_timer(
        &self,
        routine: Routine,
        auto_start: bool,
    ) -> Result<RescheduleTimer, TimerError> {
        let runtime_instance = self.init_runtime_instance()?;
        let outcome_handler = self
            .outcome_handler
            .clone()
            .unwrap_or_else(create_default_outcome_handler);

        #[allow(unused_mut)]
        let mut core = TimerCore::new(
            next_timer_id(),
            self.get_tolerance(),
            runtime_instance,
            auto_start,
            routine,
            outcome_handler,
        );

        #[cfg(feature = "status-report")]
        let mut status_reporter = None;
        #[cfg(feature = "status-report")]
        if self.enable_status_report {
            let (sender, receiver) = unbounded::<PublicEvent>();
            core.set_status_report_sender(sender);
            status_reporter = Some(StatusReporter::new(receiver));
        }

        let timer = RescheduleTimer {
            core: Arc::new(core),
            #[cfg(feature = "status-report")]
            status_reporter,
        };

        debug!(
            "timer {} built on {:?}, tolerance {:?}.",
            timer.get_timer_id(),
            timer.core.runtime_instance.kind,
            timer.get_tolerance()
        );

        if auto_start {
            timer.core.launch()?;
        }
        Ok(timer)
    }
}

impl RescheduleTimer {
    /// New a RescheduleTimer with the default tolerance and no outcome handler,
    /// its run loop is started on the `smol` global executor.
    pub fn new<F>(body: F) -> RescheduleTimer
    where
        F: FnOnce() -> AnyResult<()> + 'static + Send,
    {
        Self::launch_by_default(Routine::new_sync(body), create_default_outcome_handler())
    }

    /// New a RescheduleTimer with the default tolerance and `outcome_handler`,
    /// its run loop is started on the `smol` global executor.
    pub fn with_handler<F, H>(body: F, outcome_handler: H) -> RescheduleTimer
    where
        F: FnOnce() -> AnyResult<()> + 'static + Send,
        H: OutcomeHandler + 'static,
    {
        Self::launch_by_default(Routine::new_sync(body), Arc::new(outcome_handler))
    }

    fn launch_by_default(routine: Routine, outcome_handler: SharedOutcomeHandler) -> RescheduleTimer {
        let core = Arc::new(TimerCore::new(
            next_timer_id(),
            DEFAULT_TOLERANCE,
            RuntimeInstance::default(),
            true,
            routine,
            outcome_handler,
        ));

        // A fresh core is always launchable.
        core.launch().unwrap_or_else(|e| error!("{}", e));

        RescheduleTimer {
            core,
            #[cfg(feature = "status-report")]
            status_reporter: None,
        }
    }

    /// Schedule the routine at `deadline`.
    ///
    /// A deadline that is not in the future executes the routine immediately,
    /// the recorded deadline is left untouched in that case.
    pub fn until(&self, deadline: Instant) -> &Self {
        self.core.reschedule(deadline);
        self
    }

    /// Schedule the routine `duration` from now.
    pub fn after(&self, duration: Duration) -> &Self {
        self.until(Instant::now() + duration)
    }

    /// Push the current deadline back by `duration`,
    /// or schedule `duration` from now if no deadline was ever set.
    ///
    /// Concurrent calls all count, each one extends the deadline it finds.
    pub fn add(&self, duration: Duration) -> &Self {
        self.core.extend(duration);
        self
    }

    /// Execute the routine now, regardless of the pending deadline.
    ///
    /// Never blocks; inert once the routine has fired.
    pub fn do_immediately(&self) {
        self.core.do_immediately();
    }

    /// Stop the run loop before the routine fires.
    ///
    /// The timer stays usable, a later `until`/`after`/`add` schedules it again.
    pub fn cancel(&self) {
        self.core.cancel();
    }

    /// Start the run loop of a timer built with `build_routine` on its runtime.
    ///
    /// Only a never-started or canceled timer can be started.
    pub fn start(&self) -> Result<(), TimerError> {
        self.core.launch()
    }

    /// Drive the run loop on the current task until it fires or is canceled.
    pub async fn run(&self) -> Result<Termination, TimerError> {
        self.core.clone().run().await
    }

    /// The current deadline, `None` if the timer was never scheduled.
    pub fn get_time(&self) -> Option<Instant> {
        self.core.get_time()
    }

    /// Whether the routine has been executed.
    pub fn is_done(&self) -> bool {
        self.core.is_done()
    }

    /// Lifecycle state, one of the constants of `state::timer`.
    pub fn get_state(&self) -> TimerState {
        self.core.get_state()
    }

    /// Get the tolerance of this timer.
    pub fn get_tolerance(&self) -> Duration {
        self.core.tolerance
    }

    /// Unique id of this timer, used in logs and status reports.
    pub fn get_timer_id(&self) -> i64 {
        self.core.timer_id
    }
}

cfg_status_report!(
/// # Required features
///
/// This function requires the `status-report` feature of the `reschedule_timer`
/// crate to be enabled.
    impl RescheduleTimerBuilder {

        /// Whether to expose public events.
        pub fn enable_status_report(&mut self) -> &mut Self {
            self.enable_status_report = true;
            self
        }
    }

    impl RescheduleTimer {

        /// Take StatusReporter from RescheduleTimer, through which you can get public events.
        pub fn take_status_reporter(&mut self) -> Option<StatusReporter> {
            self.status_reporter.take()
        }

        /// Access to public events through RescheduleTimer.
        pub fn get_public_event(&self) -> Result<PublicEvent, TimerError> {

            if let Some(status_reporter_ref) = self.status_reporter.as_ref(){
               return status_reporter_ref.get_public_event();
            }

            Err(TimerError::StatusReportDisabled)
        }
    }
);
