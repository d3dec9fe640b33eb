//! Runtime subsystem modules.

pub(crate) mod control;
mod core;
pub mod overrides;
pub mod store;
pub mod yield_now;

pub use control::Control;
pub(crate) use self::core::Config;
pub use self::core::{IterationCounts, Runtime, Stats};
pub use overrides::{Interceptor, LayerId, Operation, OverrideRegistry, ops};
pub use store::{InvariantViolation, TaskStore};
pub use yield_now::{YieldNow, yield_now};
