use crate::prelude::*;

///No size type, API compliant consistency.
#[derive(Debug, Default, Copy, Clone)]
pub struct MyUnit;

impl OutcomeHandler for MyUnit {
    fn handle(&self, _outcome: AnyResult<()>) {}
}

/// Logs every failed outcome at `error` level, and successes at `debug`.
#[derive(Debug, Clone)]
pub struct LogOutcome {
    target: String,
}

impl OutcomeHandler for LogOutcome {
    fn handle(&self, outcome: AnyResult<()>) {
        match outcome {
            Ok(()) => debug!("{}: routine finished.", self.target),
            Err(e) => error!("{}: routine failed: {:?}", self.target, e),
        }
    }
}

pub mod functions {

    use super::{LogOutcome, MyUnit};
    use crate::timer::task::OutcomeHandler;
    use std::sync::Arc;

    #[inline(always)]
    ///Create a handler that ignores the outcome, the default of every timer.
    pub fn create_default_outcome_handler() -> Arc<dyn OutcomeHandler> {
        Arc::new(MyUnit)
    }

    #[inline(always)]
    ///Create a handler that logs the outcome under `target`.
    pub fn create_log_outcome_handler(target: impl Into<String>) -> LogOutcome {
        LogOutcome {
            target: target.into(),
        }
    }
}
