//! utils is a tool module that provides ready-made outcome handlers,
//! and the optional status report of timers.
pub mod convenience;
#[cfg(feature = "status-report")]
pub mod status_report;

pub use convenience::functions;
