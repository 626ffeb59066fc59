//! timer is the core module of the library , it provides the routine model,
//! the resettable alarm and the run loop of a rescheduling timer.

pub mod state;
pub mod task;
pub mod timer_core;

pub(crate) mod alarm;

pub use task::OutcomeHandler;
pub use timer_core::{Termination, DEFAULT_TOLERANCE};
