//! Deadline wrapper for suspendable computations.
//!
//! [`timeout`] wraps a computation with a deadline. If the inner computation has not finished
//! when the deadline passes, the wrapper finishes with [`TimeError::TimeOut`] and the inner
//! computation is dropped without being resumed again.
//!
//! ```ignore
//! use tickwork::time::{sleep_ms, timeout};
//! use std::time::Duration;
//!
//! let outcome = rt.block_on(timeout(Duration::from_millis(10), sleep_ms(100)))?;
//! assert_eq!(outcome, Err(TimeError::TimeOut));
//! ```
//!
//! The deadline is advisory: it is only checked when the wrapper is resumed, so accuracy is
//! bounded by the host's tick cadence.

use crate::error::TaskError;
use crate::runtime::Runtime;
use crate::task::{Coroutine, IntoCoroutine, Step};
use crate::time::TimeError;

use std::time::Duration;

/// Wraps `body` with a deadline of `duration`, measured from its first resumption.
///
/// # Returns
/// A computation finishing with `Ok(output)` if `body` finishes in time, or
/// `Err(TimeError::TimeOut)` otherwise. Failures of `body` propagate unchanged.
pub fn timeout<C: IntoCoroutine>(duration: Duration, body: C) -> Timeout<C::Coroutine> {
    Timeout {
        inner: Some(body.into_coroutine()),
        duration,
        start: None,
    }
}

/// Computation returned by [`timeout`].
pub struct Timeout<C> {
    inner: Option<C>,
    duration: Duration,
    start: Option<Duration>,
}

impl<C: Coroutine> Coroutine for Timeout<C> {
    type Output = Result<C::Output, TimeError>;

    fn resume(&mut self, rt: &Runtime) -> Result<Step<Self::Output>, TaskError> {
        let now = rt.now();
        let start = *self.start.get_or_insert(now);

        let inner = self.inner.as_mut().ok_or_else(TaskError::exhausted)?;

        if now.saturating_sub(start) >= self.duration {
            self.inner = None;
            return Ok(Step::Done(Err(TimeError::TimeOut)));
        }

        match inner.resume(rt)? {
            Step::Yield => Ok(Step::Yield),
            Step::Done(value) => {
                self.inner = None;
                Ok(Step::Done(Ok(value)))
            }
        }
    }
}
