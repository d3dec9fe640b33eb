//! Timer conveniences built from [`Sleep`] and plain task admission.

use crate::error::TaskError;
use crate::priority::Priority;
use crate::runtime::Runtime;
use crate::task::{Coroutine, IntoCoroutine, Step, TaskId};
use crate::time::Sleep;
use crate::time::sleep::sleep;

use std::time::Duration;

/// Admits a task that runs `body` once `delay` has elapsed.
///
/// The delay starts when the task is first resumed. Cancel it with [`clear_timeout`].
pub fn set_timeout<C>(rt: &Runtime, delay: Duration, body: C) -> TaskId
where
    C: IntoCoroutine,
    C::Coroutine: 'static,
{
    let task = Delayed {
        sleep: Some(sleep(delay)),
        body: body.into_coroutine(),
    };

    rt.admit(task, Priority::DEFAULT)
}

/// Cancels a timeout; `false` if it already ran or was cleared.
pub fn clear_timeout(rt: &Runtime, id: TaskId) -> bool {
    rt.cancel(id)
}

/// Admits a task that runs a fresh body from `factory` every `delay`.
///
/// Each period starts when the previous body finished. The interval only stops through
/// [`clear_interval`], or when one of its bodies fails.
pub fn set_interval<F, C>(rt: &Runtime, delay: Duration, factory: F) -> TaskId
where
    F: FnMut() -> C + 'static,
    C: IntoCoroutine + 'static,
    C::Coroutine: 'static,
{
    let task: Interval<F, C> = Interval {
        delay,
        factory,
        state: IntervalState::Waiting(sleep(delay)),
    };

    rt.admit(task, Priority::DEFAULT)
}

pub fn clear_interval(rt: &Runtime, id: TaskId) -> bool {
    rt.cancel(id)
}

struct Delayed<C> {
    sleep: Option<Sleep>,
    body: C,
}

impl<C: Coroutine> Coroutine for Delayed<C> {
    type Output = C::Output;

    fn resume(&mut self, rt: &Runtime) -> Result<Step<C::Output>, TaskError> {
        if let Some(sleep) = self.sleep.as_mut() {
            if let Step::Yield = sleep.resume(rt)? {
                return Ok(Step::Yield);
            }
            self.sleep = None;
        }

        self.body.resume(rt)
    }
}

struct Interval<F, C: IntoCoroutine> {
    delay: Duration,
    factory: F,
    state: IntervalState<C::Coroutine>,
}

enum IntervalState<C> {
    Waiting(Sleep),
    Running(C),
}

impl<F, C> Coroutine for Interval<F, C>
where
    F: FnMut() -> C,
    C: IntoCoroutine,
{
    type Output = ();

    fn resume(&mut self, rt: &Runtime) -> Result<Step<()>, TaskError> {
        if let IntervalState::Waiting(sleep) = &mut self.state {
            if let Step::Yield = sleep.resume(rt)? {
                return Ok(Step::Yield);
            }
            self.state = IntervalState::Running((self.factory)().into_coroutine());
        }

        if let IntervalState::Running(body) = &mut self.state {
            if let Step::Done(_) = body.resume(rt)? {
                self.state = IntervalState::Waiting(Sleep::starting_at(self.delay, rt.now()));
            }
        }

        Ok(Step::Yield)
    }
}
