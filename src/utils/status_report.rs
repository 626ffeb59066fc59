// status_report is mod  for report timer lifecycle
// if open feature status-report, then compile that mod .
use crate::prelude::*;

/// Receiving end of the public events of one timer.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    inner: AsyncReceiver<PublicEvent>,
}

impl StatusReporter {
    /// Take the next public event without waiting.
    pub fn get_public_event(&self) -> Result<PublicEvent, TimerError> {
        let event = self.inner.try_recv()?;
        Ok(event)
    }

    /// Wait for the next public event.
    pub async fn next_public_event_with_async_wait(&self) -> Option<PublicEvent> {
        self.inner.recv().await.ok()
    }

    pub(crate) fn new(inner: AsyncReceiver<PublicEvent>) -> Self {
        Self { inner }
    }
}

/// Lifecycle events of a timer, each carrying its timer id.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PublicEvent {
    /// A new alarm was armed for the deadline.
    Rescheduled(i64, Instant),
    /// A trigger was posted to the run loop.
    Triggered(i64),
    /// The routine ran and its outcome was handled.
    Fired(i64),
    /// The run loop was canceled.
    Canceled(i64),
}

impl PublicEvent {
    /// Id of the timer the event belongs to.
    pub fn get_timer_id(&self) -> i64 {
        match self {
            PublicEvent::Rescheduled(timer_id, _)
            | PublicEvent::Triggered(timer_id)
            | PublicEvent::Fired(timer_id)
            | PublicEvent::Canceled(timer_id) => *timer_id,
        }
    }
}
