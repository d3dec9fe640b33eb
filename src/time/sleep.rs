//! Suspend a task until enough clock time has passed.

use crate::error::TaskError;
use crate::runtime::Runtime;
use crate::task::{Coroutine, Step};

use std::time::Duration;

/// Creates a computation that finishes once `duration` has elapsed on the runtime clock.
///
/// The start time is captured on the first resumption, not at construction. A zero duration
/// finishes on the first resumption.
///
/// # Example
/// ```ignore
/// let mut nap = sleep(Duration::from_millis(5));
/// rt.spawn(task::poll_fn(move |rt| nap.resume(rt)));
/// ```
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        duration,
        start: None,
    }
}

/// [`sleep`] measured in milliseconds.
pub fn sleep_ms(millis: u64) -> Sleep {
    sleep(Duration::from_millis(millis))
}

/// Computation returned by [`sleep`].
#[derive(Debug, Clone)]
pub struct Sleep {
    duration: Duration,
    start: Option<Duration>,
}

impl Sleep {
    /// A sleep whose clock started at `start` instead of at its first resumption.
    pub(crate) fn starting_at(duration: Duration, start: Duration) -> Self {
        Sleep {
            duration,
            start: Some(start),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Coroutine for Sleep {
    type Output = ();

    fn resume(&mut self, rt: &Runtime) -> Result<Step<()>, TaskError> {
        let now = rt.now();
        let start = *self.start.get_or_insert(now);

        if now.saturating_sub(start) >= self.duration {
            Ok(Step::Done(()))
        } else {
            Ok(Step::Yield)
        }
    }
}
