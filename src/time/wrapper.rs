//! Time measurement wrapper for suspendable computations.
//!
//! This module provides [`Timed`], which wraps a computation and measures the clock time from
//! its first resumption until it finishes. Useful for checking how many ticks of wall time a
//! body actually took.
//!
//! # Example
//!
//! ```ignore
//! use tickwork::time::{sleep_ms, wrapper::Timed};
//!
//! let ((), elapsed) = rt.block_on(Timed::new(sleep_ms(100)))?;
//! println!("Slept for {:?}", elapsed);
//! ```

use crate::error::TaskError;
use crate::runtime::Runtime;
use crate::task::{Coroutine, IntoCoroutine, Step};

use std::time::Duration;

/// A computation that finishes with `(output, elapsed)` once the wrapped one finishes.
pub struct Timed<C> {
    /// Clock reading at the first resumption.
    start: Option<Duration>,
    /// The computation being measured.
    inner: C,
}

impl<C: Coroutine> Timed<C> {
    /// Wraps `body` for measurement.
    ///
    /// # Arguments
    /// * `body` - the computation to measure
    pub fn new<B>(body: B) -> Self
    where
        B: IntoCoroutine<Coroutine = C>,
    {
        Self {
            start: None,
            inner: body.into_coroutine(),
        }
    }
}

impl<C: Coroutine> Coroutine for Timed<C> {
    type Output = (C::Output, Duration);

    fn resume(&mut self, rt: &Runtime) -> Result<Step<Self::Output>, TaskError> {
        let start = *self.start.get_or_insert_with(|| rt.now());

        Ok(self
            .inner
            .resume(rt)?
            .map(|value| (value, rt.now().saturating_sub(start))))
    }
}
