//! Time utilities: clocks, sleep, timeout, timers and task timing.
//!
//! Nothing here blocks. Every wait is a suspend loop that compares the runtime clock against a
//! start time captured on the first resumption, so waits only make progress while the host
//! keeps ticking.
//!
//! - [`sleep`] finishes once a duration has elapsed
//! - [`timeout`] races a computation against a deadline
//! - [`set_timeout`] / [`set_interval`] admit delayed and periodic tasks
//! - [`wrapper::Timed`] measures how long a computation took
//!
//! # Example: Sleep
//!
//! ```ignore
//! use tickwork::{Runtime, task, time::sleep_ms};
//!
//! let rt = Runtime::new();
//! let mut nap = sleep_ms(50);
//! rt.spawn(task::poll_fn(move |rt| nap.resume(rt)));
//! ```
//!
//! # Example: Deterministic Time
//!
//! ```ignore
//! use tickwork::{RuntimeBuilder, time::{ManualClock, set_timeout}};
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let rt = RuntimeBuilder::new().clock(clock.clone()).build();
//! set_timeout(&rt, Duration::from_millis(10), task::from_fn(|_| Ok(println!("fired"))));
//!
//! rt.tick();                                // starts the delay
//! clock.advance(Duration::from_millis(10));
//! rt.tick();                                // fired
//! ```
//!
//! # Errors
//!
//! [`TimeError`] is the value [`timeout`] finishes with when the deadline passes first.

pub mod clock;
pub mod sleep;
pub mod timeout;
pub mod timers;
pub mod wrapper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use sleep::{Sleep, sleep, sleep_ms};
pub use timeout::{Timeout, timeout};
pub use timers::{clear_interval, clear_timeout, set_interval, set_timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("deadline elapsed")]
    TimeOut,
}
