//! RescheduleTimer fires one routine, at most once, at a deadline that can be
//! pushed back and forth any number of times before it elapses.
//!
//! Deadlines that land within the timer's tolerance of the armed one are
//! coalesced, so a burst of reschedules never leaves more than one alarm sleeping.
//! The routine may be synchronous or asynchronous, and runs on the global executor
//! of `smol` or on a `tokio` runtime.
//!
//! # Usage
//!
//! ```
//! use reschedule_timer::prelude::*;
//! use std::thread::sleep;
//! use std::time::Duration;
//!
//! let timer = RescheduleTimer::with_handler(
//!     || Err(anyhow!("dumb error")),
//!     |outcome: AnyResult<()>| println!("routine finished: {:?}", outcome),
//! );
//!
//! // Nudges smaller than the tolerance (1s) reuse the armed alarm.
//! for _ in 0..3 {
//!     timer.after(Duration::from_millis(300));
//! }
//! assert!(!timer.is_done());
//!
//! sleep(Duration::from_millis(1500));
//! assert!(timer.is_done());
//! ```
//!
//! A timer built with `build_routine` is not started, drive it yourself:
//!
//! ```
//! use reschedule_timer::prelude::*;
//!
//! let timer = RescheduleTimerBuilder::default()
//!     .build_async_routine(|| async { Ok(()) })
//!     .unwrap();
//!
//! timer.do_immediately();
//! let termination = smol::block_on(timer.run()).unwrap();
//! assert_eq!(termination, Termination::Fired);
//! ```

#[macro_use]
pub mod macros;

pub mod entity;
pub mod error;
pub mod prelude;
pub mod timer;
pub mod utils;
