//! The routine a timer fires and the handler that receives its outcome.

use crate::prelude::*;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;

use futures::FutureExt;

#[cfg(test)]
use mockall::automock;

pub(crate) type SafeBoxFn = Box<dyn FnOnce() -> AnyResult<()> + 'static + Send>;
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = AnyResult<()>> + 'static + Send>>;
pub(crate) type SafeBoxAsyncFn = Box<dyn FnOnce() -> BoxFuture + 'static + Send>;

/// Receives the outcome of the routine, exactly once, after it ran.
///
/// Every `Fn(AnyResult<()>)` closure is an `OutcomeHandler`.
#[cfg_attr(test, automock)]
pub trait OutcomeHandler: Send + Sync {
    /// Consume the outcome of the routine.
    fn handle(&self, outcome: AnyResult<()>);
}

impl<F> OutcomeHandler for F
where
    F: Fn(AnyResult<()>) + Send + Sync,
{
    fn handle(&self, outcome: AnyResult<()>) {
        (self)(outcome)
    }
}

pub(crate) type SharedOutcomeHandler = Arc<dyn OutcomeHandler>;

// The routine is stored as an enum rather than a generic parameter so that
// `RescheduleTimer` stays a single nameable type for both kinds of bodies.
pub(crate) enum Routine {
    Sync(SafeBoxFn),
    Async(SafeBoxAsyncFn),
}

impl fmt::Debug for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Routine::Sync(_) => f.write_str("Routine::Sync"),
            Routine::Async(_) => f.write_str("Routine::Async"),
        }
    }
}

impl Routine {
    pub(crate) fn new_sync<F>(body: F) -> Self
    where
        F: FnOnce() -> AnyResult<()> + 'static + Send,
    {
        Routine::Sync(Box::new(body))
    }

    pub(crate) fn new_async<F, U>(body: F) -> Self
    where
        F: FnOnce() -> U + 'static + Send,
        U: Future<Output = AnyResult<()>> + 'static + Send,
    {
        Routine::Async(Box::new(move || Box::pin(body()) as BoxFuture))
    }

    /// Run the routine to completion on `runtime`.
    ///
    /// Synchronous bodies go to the blocking pool of the runtime.
    /// A panic is reported as `TimerError::RoutinePanicked` instead of unwinding the run loop.
    pub(crate) async fn execute(self, runtime: &RuntimeInstance) -> AnyResult<()> {
        match self {
            Routine::Sync(body) => {
                let guarded = move || {
                    catch_unwind(AssertUnwindSafe(body))
                        .unwrap_or_else(|_| Err(TimerError::RoutinePanicked.into()))
                };

                match runtime.kind {
                    RuntimeKind::Smol => unblock_spawn_by_smol(guarded).await,
                    RuntimeKind::Tokio => match runtime.tokio_handle() {
                        Some(handle) => handle
                            .spawn_blocking(guarded)
                            .await
                            .unwrap_or_else(|e| Err(TimerError::from(e).into())),
                        None => guarded(),
                    },
                }
            }

            Routine::Async(body) => AssertUnwindSafe(async move { body().await })
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(TimerError::RoutinePanicked.into())),
        }
    }
}
