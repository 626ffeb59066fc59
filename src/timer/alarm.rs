//! A resettable alarm.
//!
//! # Alarm
//!
//! Every reschedule that leaves the tolerance window arms a fresh `Alarm` and drops
//! the previous one, so a timer never has more than one sleeping waiter:
//!
//! 1. Dropping an `Alarm` cancels the sleep (smol task cancel / tokio abort).
//! 2. Each alarm carries the generation it was armed for; the timer ignores
//!    an elapsed alarm whose generation is stale.

use crate::prelude::*;

enum AlarmHandle {
    Smol(SmolJoinHandler<()>),
    Tokio(TokioJoinHandle<()>),
}

pub(crate) struct Alarm {
    generation: u64,
    deadline: Instant,
    handle: Option<AlarmHandle>,
}

impl fmt::Debug for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alarm")
            .field("generation", &self.generation)
            .field("deadline", &self.deadline)
            .field("armed", &self.handle.is_some())
            .finish()
    }
}

impl Alarm {
    /// Sleep until `deadline` on `runtime`, then call `on_elapsed`.
    pub(crate) fn arm<F>(
        runtime: &RuntimeInstance,
        timer_id: i64,
        generation: u64,
        deadline: Instant,
        on_elapsed: F,
    ) -> Alarm
    where
        F: FnOnce() + Send + 'static,
    {
        let span = debug_span!("alarm", timer_id, generation);

        let handle = match runtime.tokio_handle() {
            Some(handle) if runtime.kind == RuntimeKind::Tokio => {
                AlarmHandle::Tokio(handle.spawn(
                    async move {
                        sleep_until_by_tokio(TokioInstant::from_std(deadline)).await;
                        trace!("alarm elapsed.");
                        on_elapsed();
                    }
                    .instrument(span),
                ))
            }

            _ => AlarmHandle::Smol(async_spawn_by_smol(
                async move {
                    AsyncTimer::at(deadline).await;
                    trace!("alarm elapsed.");
                    on_elapsed();
                }
                .instrument(span),
            )),
        };

        Alarm {
            generation,
            deadline,
            handle: Some(handle),
        }
    }

    pub(crate) fn get_generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn get_deadline(&self) -> Instant {
        self.deadline
    }

    /// Let go of an alarm that already elapsed without cancelling it.
    ///
    /// Called from inside the alarm's own task, which is about to finish anyway.
    pub(crate) fn detach(mut self) {
        match self.handle.take() {
            Some(AlarmHandle::Smol(task)) => task.detach(),
            Some(AlarmHandle::Tokio(join_handle)) => drop(join_handle),
            None => {}
        }
    }
}

impl Drop for Alarm {
    fn drop(&mut self) {
        match self.handle.take() {
            // When SmolTask is dropped, async task is cancel.
            Some(AlarmHandle::Smol(task)) => drop(task),
            Some(AlarmHandle::Tokio(join_handle)) => join_handle.abort(),
            None => {}
        }
    }
}
