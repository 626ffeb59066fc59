//! The shared core of a `RescheduleTimer`.
//!
//! # TimerCore
//!
//! Owns everything the user handle, the run loop and the alarm touch concurrently:
//!
//! 1. `Schedule`, guarded by one mutex: lifecycle state, deadline, armed alarm and
//!    the signal mailbox.
//! 2. The `done` flag, an atomic so `is_done` never takes the lock.
//! 3. An `Event` that wakes the run loop whenever a signal is posted.
//!
//! Posting a signal never blocks: the mailbox keeps at most one signal. A trigger
//! overrides a cancel the run loop has not seen yet, otherwise the first one wins.

use super::alarm::Alarm;
use super::task::{Routine, SharedOutcomeHandler};
use crate::prelude::*;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{
    AtomicBool, AtomicUsize,
    Ordering::{AcqRel, Acquire, Release},
};
use std::sync::{Mutex, MutexGuard, PoisonError};

use event_listener::Event;

/// Default tolerance of a timer, deadlines closer than this are coalesced.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(1);

/// Signals understood by the run loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Signal {
    /// Execute the routine now.
    Trigger,
    /// Exit without executing the routine.
    Cancel,
}

/// How a run loop ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The routine was executed and its outcome handed to the handler.
    Fired,
    /// The run loop was canceled before the routine ran.
    Canceled,
}

#[derive(Debug)]
pub(crate) struct Schedule {
    pub(crate) state: TimerState,
    pub(crate) deadline: Option<Instant>,
    // Bumped on every re-arm and on cancel, stale alarms compare against it.
    generation: u64,
    alarm: Option<Alarm>,
    signal: Option<Signal>,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule {
            state: state::timer::IDLE,
            deadline: None,
            generation: 0,
            alarm: None,
            signal: None,
        }
    }
}

impl Schedule {
    fn is_spent(&self) -> bool {
        self.state & state::timer::SPENT != 0
    }

    // Store the signal unless one is already waiting, a pending cancel yields to a trigger.
    fn post(&mut self, signal: Signal) -> bool {
        match (self.signal, signal) {
            (None, _) | (Some(Signal::Cancel), Signal::Trigger) => {
                self.signal = Some(signal);
                true
            }
            _ => false,
        }
    }

    fn disarm(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.alarm = None;
    }
}

pub(crate) struct TimerCore {
    pub(crate) timer_id: i64,
    pub(crate) tolerance: Duration,
    pub(crate) runtime_instance: RuntimeInstance,
    // Relaunch the run loop on reschedule after a cancel.
    pub(crate) auto_start: bool,
    // Live `RescheduleTimer` handles.
    pub(crate) handles: AtomicUsize,
    routine: Mutex<Option<Routine>>,
    outcome_handler: SharedOutcomeHandler,
    schedule: Mutex<Schedule>,
    done: AtomicBool,
    event: Event,
    #[cfg(feature = "status-report")]
    status_report_sender: Option<AsyncSender<PublicEvent>>,
}

impl fmt::Debug for TimerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerCore")
            .field("timer_id", &self.timer_id)
            .field("tolerance", &self.tolerance)
            .field("runtime_instance", &self.runtime_instance)
            .field("auto_start", &self.auto_start)
            .field("schedule", &*self.lock_schedule())
            .field("done", &self.done.load(Acquire))
            .finish()
    }
}

impl TimerCore {
    pub(crate) fn new(
        timer_id: i64,
        tolerance: Duration,
        runtime_instance: RuntimeInstance,
        auto_start: bool,
        routine: Routine,
        outcome_handler: SharedOutcomeHandler,
    ) -> Self {
        TimerCore {
            timer_id,
            tolerance,
            runtime_instance,
            auto_start,
            handles: AtomicUsize::new(1),
            routine: Mutex::new(Some(routine)),
            outcome_handler,
            schedule: Mutex::new(Schedule::default()),
            done: AtomicBool::new(false),
            event: Event::new(),
            #[cfg(feature = "status-report")]
            status_report_sender: None,
        }
    }

    cfg_status_report!(
        pub(crate) fn set_status_report_sender(&mut self, sender: AsyncSender<PublicEvent>) {
            self.status_report_sender = Some(sender);
        }

        fn report(&self, event: PublicEvent) {
            if let Some(sender) = self.status_report_sender.as_ref() {
                sender
                    .try_send(event)
                    .unwrap_or_else(|e| debug!("status report dropped: {}", e));
            }
        }
    );

    // Every write leaves the schedule consistent, poisoning is ignored.
    fn lock_schedule(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Acquire)
    }

    pub(crate) fn get_state(&self) -> TimerState {
        self.lock_schedule().state
    }

    pub(crate) fn get_time(&self) -> Option<Instant> {
        self.lock_schedule().deadline
    }

    pub(crate) fn is_approximately_equal(&self, current: Instant, requested: Instant) -> bool {
        let distance = if current > requested {
            current - requested
        } else {
            requested - current
        };

        distance <= self.tolerance
    }

    /// Move the deadline to `deadline`, re-arming the alarm only when the
    /// armed deadline is farther than the tolerance away.
    ///
    /// A deadline that is not in the future triggers the routine instead.
    pub(crate) fn reschedule(self: &Arc<Self>, deadline: Instant) {
        let schedule = self.lock_schedule();
        self.reschedule_locked(schedule, deadline);
    }

    /// Push the recorded deadline back by `duration`, or schedule `duration`
    /// from now if there is none. Read and write share one critical section.
    pub(crate) fn extend(self: &Arc<Self>, duration: Duration) {
        let schedule = self.lock_schedule();
        let deadline = schedule.deadline.unwrap_or_else(Instant::now) + duration;
        self.reschedule_locked(schedule, deadline);
    }

    fn reschedule_locked(self: &Arc<Self>, mut schedule: MutexGuard<'_, Schedule>, deadline: Instant) {
        if deadline <= Instant::now() {
            return self.post_trigger(schedule);
        }

        if schedule.is_spent() {
            trace!("timer {} already fired, reschedule is inert.", self.timer_id);
            return;
        }

        // The requested deadline is always recorded, so `add` accumulates,
        // but the alarm is only re-armed once it drifts out of tolerance.
        schedule.deadline = Some(deadline);
        let coalesced = schedule
            .alarm
            .as_ref()
            .map_or(false, |alarm| self.is_approximately_equal(alarm.get_deadline(), deadline));
        if coalesced {
            trace!(
                "timer {} coalesced a deadline within {:?} of the armed one.",
                self.timer_id,
                self.tolerance
            );
            return;
        }

        schedule.disarm();
        let generation = schedule.generation;
        let core = Arc::downgrade(self);
        schedule.alarm = Some(Alarm::arm(
            &self.runtime_instance,
            self.timer_id,
            generation,
            deadline,
            move || {
                if let Some(core) = core.upgrade() {
                    core.alarm_elapsed(generation);
                }
            },
        ));

        debug!(
            "timer {} rescheduled, fires in {:?}.",
            self.timer_id,
            deadline.saturating_duration_since(Instant::now())
        );
        #[cfg(feature = "status-report")]
        self.report(PublicEvent::Rescheduled(self.timer_id, deadline));

        self.relaunch_if_cancelled(&mut schedule);
    }

    fn alarm_elapsed(self: &Arc<Self>, generation: u64) {
        let mut schedule = self.lock_schedule();

        if schedule.generation != generation {
            trace!(
                "timer {} alarm of generation {} was superseded.",
                self.timer_id,
                generation
            );
            return;
        }

        if let Some(alarm) = schedule.alarm.take() {
            alarm.detach();
        }

        self.post_trigger(schedule);
    }

    pub(crate) fn do_immediately(self: &Arc<Self>) {
        let schedule = self.lock_schedule();
        self.post_trigger(schedule);
    }

    fn post_trigger(self: &Arc<Self>, mut schedule: MutexGuard<'_, Schedule>) {
        if schedule.is_spent() {
            trace!("timer {} already fired, trigger is inert.", self.timer_id);
            return;
        }

        if schedule.post(Signal::Trigger) {
            #[cfg(feature = "status-report")]
            self.report(PublicEvent::Triggered(self.timer_id));
        }
        self.relaunch_if_cancelled(&mut schedule);
        drop(schedule);

        self.event.notify(1);
    }

    pub(crate) fn cancel(&self) {
        let mut schedule = self.lock_schedule();
        schedule.disarm();

        match schedule.state {
            // No loop to wake, drop whatever was buffered for the next start.
            s if s & state::timer::LAUNCHABLE != 0 => {
                schedule.signal = None;
                if s == state::timer::IDLE {
                    debug!("timer {} canceled before its run loop started.", self.timer_id);
                    #[cfg(feature = "status-report")]
                    self.report(PublicEvent::Canceled(self.timer_id));
                }
                schedule.state = state::timer::CANCELLED;
            }

            state::timer::RUNNING => {
                schedule.post(Signal::Cancel);
                drop(schedule);
                self.event.notify(1);
            }

            _ => trace!("timer {} has no live run loop to cancel.", self.timer_id),
        }
    }

    /// Called when the last `RescheduleTimer` handle is dropped.
    ///
    /// A run loop with no alarm and no signal could never be woken again, stop it.
    /// A pending deadline is left to fire.
    pub(crate) fn release_handle(&self) {
        if self.handles.fetch_sub(1, AcqRel) != 1 {
            return;
        }

        let mut schedule = self.lock_schedule();
        if schedule.state == state::timer::RUNNING
            && schedule.alarm.is_none()
            && schedule.signal.is_none()
        {
            debug!("timer {} dropped while idle, stopping its run loop.", self.timer_id);
            schedule.post(Signal::Cancel);
            drop(schedule);
            self.event.notify(1);
        }
    }

    fn relaunch_if_cancelled(self: &Arc<Self>, schedule: &mut Schedule) {
        if self.auto_start && schedule.state == state::timer::CANCELLED {
            debug!("timer {} rescheduled after cancel, relaunching.", self.timer_id);
            schedule.state = state::timer::RUNNING;
            self.spawn_run_loop();
        }
    }

    fn begin_launch(&self) -> Result<(), TimerError> {
        let mut schedule = self.lock_schedule();

        match schedule.state {
            s if s & state::timer::LAUNCHABLE != 0 => {
                schedule.state = state::timer::RUNNING;
                Ok(())
            }
            state::timer::COMPLETED => Err(TimerError::AlreadyFired),
            _ => Err(TimerError::AlreadyRunning),
        }
    }

    /// Start the run loop on the runtime of the timer.
    pub(crate) fn launch(self: &Arc<Self>) -> Result<(), TimerError> {
        self.begin_launch()?;
        self.spawn_run_loop();
        Ok(())
    }

    /// Drive the run loop on the caller's task.
    pub(crate) async fn run(self: Arc<Self>) -> Result<Termination, TimerError> {
        self.begin_launch()?;

        let span = info_span!("run_loop", timer_id = self.timer_id);
        Ok(self.run_loop().instrument(span).await)
    }

    fn spawn_run_loop(self: &Arc<Self>) {
        let core = self.clone();
        let span = info_span!("run_loop", timer_id = self.timer_id);

        self.runtime_instance.spawn_detached(
            async move {
                core.run_loop().await;
            }
            .instrument(span),
        );
    }

    async fn run_loop(self: Arc<Self>) -> Termination {
        debug!("timer {} run loop started.", self.timer_id);

        loop {
            // Listen before looking, so a signal posted in between still wakes us.
            let listener = self.event.listen();

            match self.take_signal() {
                Some(Signal::Trigger) => return self.fire().await,
                Some(Signal::Cancel) => {
                    debug!("timer {} run loop canceled.", self.timer_id);
                    #[cfg(feature = "status-report")]
                    self.report(PublicEvent::Canceled(self.timer_id));
                    return Termination::Canceled;
                }
                None => listener.await,
            }
        }
    }

    fn take_signal(&self) -> Option<Signal> {
        let mut schedule = self.lock_schedule();
        let signal = schedule.signal.take()?;

        schedule.state = match signal {
            Signal::Trigger => state::timer::EXECUTING,
            Signal::Cancel => state::timer::CANCELLED,
        };
        Some(signal)
    }

    async fn fire(&self) -> Termination {
        let routine = self
            .routine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match routine {
            Some(routine) => {
                info!("timer {} fired.", self.timer_id);
                let outcome = routine.execute(&self.runtime_instance).await;
                if let Err(ref e) = outcome {
                    debug!("timer {} routine failed: {}", self.timer_id, e);
                }
                let handler = AssertUnwindSafe(|| self.outcome_handler.handle(outcome));
                if catch_unwind(handler).is_err() {
                    error!("timer {} outcome handler panicked.", self.timer_id);
                }
            }
            None => error!("timer {} lost its routine before firing.", self.timer_id),
        }

        self.done.store(true, Release);
        let mut schedule = self.lock_schedule();
        schedule.state = state::timer::COMPLETED;
        schedule.disarm();
        drop(schedule);

        #[cfg(feature = "status-report")]
        self.report(PublicEvent::Fired(self.timer_id));
        Termination::Fired
    }
}
