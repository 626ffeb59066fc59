//! A "prelude" for users of the `reschedule-timer` crate.
//!
//! This prelude is similar to the standard library's prelude in that you'll
//! almost always want to import its entire contents, but unlike the standard
//! library's prelude you'll have to do so manually:
//!
//! ```
//! use reschedule_timer::prelude::*;
//! ```
//!
//! The prelude may grow over time as additional items see ubiquitous use.

pub use crate::entity::{RescheduleTimer, RescheduleTimerBuilder, RuntimeKind};
pub use crate::error::*;
pub use crate::timer::state;
pub use crate::timer::task::OutcomeHandler;
pub use crate::timer::timer_core::{Termination, DEFAULT_TOLERANCE};

pub use crate::utils::convenience::functions::{
    create_default_outcome_handler, create_log_outcome_handler,
};

pub use anyhow::{anyhow, Result as AnyResult};
pub use smol::channel;
pub use smol::spawn as async_spawn_by_smol;
pub use smol::unblock as unblock_spawn_by_smol;
pub use smol::Task as SmolJoinHandler;
pub use thiserror::Error;

/// Lifecycle state of a timer, see `state::timer`.
pub type TimerState = usize;

pub(crate) use crate::entity::RuntimeInstance;
pub(crate) use log::{debug, error, info, trace};
pub(crate) use smol::Timer as AsyncTimer;
pub(crate) use std::fmt;
pub(crate) use std::future::Future;
pub(crate) use std::sync::Arc;
pub(crate) use std::time::{Duration, Instant};
pub(crate) use tokio::runtime::Handle as TokioHandle;
pub(crate) use tokio::time::Instant as TokioInstant;
pub(crate) use tracing::{debug_span, info_span, Instrument};

pub use tokio::task::JoinHandle as TokioJoinHandle;
pub use tokio::time::{sleep as sleep_by_tokio, sleep_until as sleep_until_by_tokio};

cfg_status_report!(
    pub use crate::utils::status_report::{PublicEvent, StatusReporter};
    pub(crate) use smol::channel::{unbounded, Receiver as AsyncReceiver, Sender as AsyncSender};
);
