//! Cooperative, tick-driven task runtime.
//!
//! This crate runs many small units of work on a single thread without preemption. The host
//! owns the loop: it calls [`Runtime::tick`] on its own cadence (a frame callback, a game loop,
//! a timer) and each tick resumes pending tasks by one suspend point.
//!
//! # Architecture
//!
//! - **Runtime**: the scheduler engine; selects tasks, resumes them, applies control flags
//! - **TaskStore**: tasks grouped in priority buckets, served round-robin
//! - **Coroutine**: the resumable computation every task is normalized into
//! - **OverrideRegistry**: name-indexed interception of runtime operations by layers
//! - **Deferred**: a value settled later, with continuations and combinators
//! - **Mailboxes**: per-task message queues and the exec/join primitive
//! - **RuntimeBuilder**: fluent configuration of reporter, clock and step budget
//! - **Timers**: sleep, timeout, set_timeout and set_interval as suspend loops
//!
//! # Example
//!
//! ```ignore
//! use tickwork::{Runtime, Step, task};
//!
//! let rt = Runtime::new();
//! let mut frames = 0;
//! rt.spawn(task::poll_fn(move |_| {
//!     frames += 1;
//!     Ok(if frames == 3 { Step::Done(()) } else { Step::Yield })
//! }));
//!
//! while !rt.is_idle() {
//!     rt.tick();
//! }
//! ```

mod builder;
pub mod channel;
pub mod error;
pub mod future;
pub mod logging;
pub mod priority;
pub mod report;
pub mod runtime;
pub mod task;
pub mod time;
mod utils;

pub use builder::RuntimeBuilder;
pub use error::{Error, Result, TaskError};
pub use priority::Priority;
pub use report::{ErrorReport, TracingReport};
pub use runtime::{IterationCounts, Runtime, Stats, yield_now};
pub use task::{Coroutine, IntoCoroutine, Step, TaskId};
