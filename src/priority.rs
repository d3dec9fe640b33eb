//! Task priorities and the fixed-priority admission helpers.
//!
//! Priorities are plain signed integers; higher values are serviced first. Two sentinels
//! bound the range: [`Priority::MAXIMUM`] preempts everything at the next task boundary and
//! [`Priority::MINIMUM`] only runs when nothing else is pending.
//!
//! ```ignore
//! use tickwork::{Runtime, priority, task};
//!
//! let rt = Runtime::new();
//! priority::idle(&rt, task::from_fn(|_| Ok(println!("last"))));
//! priority::queue_microtask(&rt, task::from_fn(|_| Ok(println!("first"))));
//! ```

use crate::runtime::Runtime;
use crate::task::{IntoCoroutine, TaskId};

use std::fmt;

/// Scheduling priority of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Priority(pub i64);

impl Priority {
    /// Upper sentinel, used by [`critical`].
    pub const MAXIMUM: Priority = Priority(i64::MAX);
    /// Lower sentinel, used by [`idle`].
    pub const MINIMUM: Priority = Priority(i64::MIN);
    pub const DEFAULT: Priority = Priority(0);
    /// Used by [`queue_microtask`] and by deferred-value continuations.
    pub const MICROTASK: Priority = Priority(1);
    pub const NEXT_TICK: Priority = Priority(2);
}

impl From<i64> for Priority {
    fn from(value: i64) -> Self {
        Priority(value)
    }
}

// Unsuffixed literals fall back to i32, so `rt.admit(task, 5)` needs this one.
impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Priority(i64::from(value))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Priority::MAXIMUM => f.write_str("max"),
            Priority::MINIMUM => f.write_str("min"),
            Priority(value) => write!(f, "{value}"),
        }
    }
}

/// Admits `body` at [`Priority::MICROTASK`].
pub fn queue_microtask<C>(rt: &Runtime, body: C) -> TaskId
where
    C: IntoCoroutine,
    C::Coroutine: 'static,
{
    rt.admit(body, Priority::MICROTASK)
}

/// Admits `body` at [`Priority::NEXT_TICK`].
pub fn next_tick<C>(rt: &Runtime, body: C) -> TaskId
where
    C: IntoCoroutine,
    C::Coroutine: 'static,
{
    rt.admit(body, Priority::NEXT_TICK)
}

/// Admits `body` at [`Priority::MINIMUM`].
pub fn idle<C>(rt: &Runtime, body: C) -> TaskId
where
    C: IntoCoroutine,
    C::Coroutine: 'static,
{
    rt.admit(body, Priority::MINIMUM)
}

/// Admits `body` at [`Priority::MAXIMUM`].
pub fn critical<C>(rt: &Runtime, body: C) -> TaskId
where
    C: IntoCoroutine,
    C::Coroutine: 'static,
{
    rt.admit(body, Priority::MAXIMUM)
}
