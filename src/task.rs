//! Suspendable computations and the normalizer that lifts task inputs into them.
//!
//! The engine only ever sees one shape of work: a [`Coroutine`] that is resumed one suspend
//! point at a time and reports whether it yielded, finished with a value, or failed.
//!
//! # Normalizing Inputs
//!
//! Anything admitted to the runtime goes through [`IntoCoroutine`]. The constructors in this
//! module cover the three kinds of input a task can start from:
//!
//! - a computation that already suspends: any [`Coroutine`], [`poll_fn`], or an `async`
//!   block via [`from_future`]
//! - a callable: [`from_fn`] runs it on the first resume and finishes in that step, while
//!   [`lazy`] calls it and continues with the computation it returns
//! - a bare value: [`ready`]
//!
//! ```ignore
//! use tickwork::{Runtime, Step, task};
//!
//! let rt = Runtime::new();
//! rt.spawn(task::ready(7));
//! rt.spawn(task::from_fn(|_| Ok(println!("once"))));
//!
//! let mut left = 3;
//! rt.spawn(task::poll_fn(move |_| {
//!     left -= 1;
//!     Ok(if left == 0 { Step::Done(()) } else { Step::Yield })
//! }));
//! ```
//!
//! # How Tasks Run
//!
//! 1. An input is normalized into a [`Coroutine`]
//! 2. The runtime erases its output and stores it in a priority bucket
//! 3. Each scheduling step resumes exactly one task by one suspend point
//! 4. `Step::Yield` keeps the task in its bucket for a later step
//! 5. `Step::Done` or an error removes it from the runtime

use crate::error::TaskError;
use crate::runtime::Runtime;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// Unique, monotonically increasing task identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    /// Builds an id from its raw number. Ids handed out by a runtime start at 1.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of resuming a computation by one suspend point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    /// Suspended; resume again on a later scheduling step.
    Yield,
    /// Finished with a value.
    Done(T),
}

impl<T> Step<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<U> {
        match self {
            Step::Yield => Step::Yield,
            Step::Done(value) => Step::Done(f(value)),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done(_))
    }
}

/// A computation that can be resumed one suspend point at a time.
///
/// The runtime handle is passed on every resumption so a body can admit tasks, cancel them,
/// request control changes, or read its own id while it runs.
///
/// Resuming again after [`Step::Done`] is a logic error; the adapters in this module fail
/// with a [`TaskError`] in that case.
pub trait Coroutine {
    type Output;

    fn resume(&mut self, rt: &Runtime) -> Result<Step<Self::Output>, TaskError>;
}

impl<C: Coroutine + ?Sized> Coroutine for Box<C> {
    type Output = C::Output;

    fn resume(&mut self, rt: &Runtime) -> Result<Step<Self::Output>, TaskError> {
        (**self).resume(rt)
    }
}

/// Type-erased task body as stored by the runtime.
pub type BoxedTask = Box<dyn Coroutine<Output = ()>>;

/// Conversion into a [`Coroutine`]; the identity for anything that already is one.
pub trait IntoCoroutine {
    type Output;
    type Coroutine: Coroutine<Output = Self::Output>;

    fn into_coroutine(self) -> Self::Coroutine;
}

impl<C: Coroutine> IntoCoroutine for C {
    type Output = C::Output;
    type Coroutine = C;

    fn into_coroutine(self) -> C {
        self
    }
}

/// Normalizes `input` and erases its output so the runtime can store it.
pub(crate) fn boxed<C>(input: C) -> BoxedTask
where
    C: IntoCoroutine,
    C::Coroutine: 'static,
{
    Box::new(Discard(input.into_coroutine()))
}

struct Discard<C>(C);

impl<C: Coroutine> Coroutine for Discard<C> {
    type Output = ();

    fn resume(&mut self, rt: &Runtime) -> Result<Step<()>, TaskError> {
        Ok(self.0.resume(rt)?.map(|_| ()))
    }
}

/// A bare value lifted into a computation that completes on its first resume.
#[derive(Debug)]
pub struct Ready<T>(Option<T>);

pub fn ready<T>(value: T) -> Ready<T> {
    Ready(Some(value))
}

impl<T> Coroutine for Ready<T> {
    type Output = T;

    fn resume(&mut self, _rt: &Runtime) -> Result<Step<T>, TaskError> {
        self.0.take().map(Step::Done).ok_or_else(TaskError::exhausted)
    }
}

/// A callable run once on the first resume.
pub struct FromFn<F>(Option<F>);

/// Lifts a plain callable. Arguments are whatever the closure captures.
pub fn from_fn<F, T>(f: F) -> FromFn<F>
where
    F: FnOnce(&Runtime) -> Result<T, TaskError>,
{
    FromFn(Some(f))
}

impl<F, T> Coroutine for FromFn<F>
where
    F: FnOnce(&Runtime) -> Result<T, TaskError>,
{
    type Output = T;

    fn resume(&mut self, rt: &Runtime) -> Result<Step<T>, TaskError> {
        let f = self.0.take().ok_or_else(TaskError::exhausted)?;
        f(rt).map(Step::Done)
    }
}

/// A callable whose result is itself suspendable.
pub struct Lazy<F, R: IntoCoroutine> {
    state: LazyState<F, R::Coroutine>,
}

enum LazyState<F, C> {
    Init(F),
    Running(C),
    Finished,
}

/// Calls `f` on the first resume and keeps resuming the computation it returns.
///
/// The returned computation gets its first resume in the same step, so a callable that
/// produces an already-finished computation completes in exactly one step.
pub fn lazy<F, R>(f: F) -> Lazy<F, R>
where
    F: FnOnce(&Runtime) -> R,
    R: IntoCoroutine,
{
    Lazy {
        state: LazyState::Init(f),
    }
}

impl<F, R> Coroutine for Lazy<F, R>
where
    F: FnOnce(&Runtime) -> R,
    R: IntoCoroutine,
{
    type Output = R::Output;

    fn resume(&mut self, rt: &Runtime) -> Result<Step<R::Output>, TaskError> {
        if matches!(self.state, LazyState::Init(_)) {
            if let LazyState::Init(f) = std::mem::replace(&mut self.state, LazyState::Finished) {
                self.state = LazyState::Running(f(rt).into_coroutine());
            }
        }

        let LazyState::Running(inner) = &mut self.state else {
            return Err(TaskError::exhausted());
        };

        let step = inner.resume(rt);
        if !matches!(step, Ok(Step::Yield)) {
            self.state = LazyState::Finished;
        }

        step
    }
}

/// An explicit state machine driven by a closure.
pub struct PollFn<F>(F);

pub fn poll_fn<F, T>(f: F) -> PollFn<F>
where
    F: FnMut(&Runtime) -> Result<Step<T>, TaskError>,
{
    PollFn(f)
}

impl<F, T> Coroutine for PollFn<F>
where
    F: FnMut(&Runtime) -> Result<Step<T>, TaskError>,
{
    type Output = T;

    fn resume(&mut self, rt: &Runtime) -> Result<Step<T>, TaskError> {
        (self.0)(rt)
    }
}

/// A Rust future driven as a task body.
///
/// The future is polled once per resumption with a no-op waker; `Poll::Pending` is a
/// suspension. Wake-ups are unnecessary because every pending task is resumed again by
/// the round-robin scheduler.
pub struct FromFuture<F> {
    future: Option<Pin<Box<F>>>,
}

/// Adapts an `async` block (or any future) returning `Result<T, TaskError>`.
pub fn from_future<F, T>(future: F) -> FromFuture<F>
where
    F: Future<Output = Result<T, TaskError>>,
{
    FromFuture {
        future: Some(Box::pin(future)),
    }
}

impl<F, T> Coroutine for FromFuture<F>
where
    F: Future<Output = Result<T, TaskError>>,
{
    type Output = T;

    fn resume(&mut self, _rt: &Runtime) -> Result<Step<T>, TaskError> {
        let future = self.future.as_mut().ok_or_else(TaskError::exhausted)?;
        let mut context = Context::from_waker(Waker::noop());

        match future.as_mut().poll(&mut context) {
            Poll::Pending => Ok(Step::Yield),
            Poll::Ready(result) => {
                self.future = None;
                result.map(Step::Done)
            }
        }
    }
}

/// Normalizes `body` for driving to completion from inside another task.
///
/// The caller resumes the returned computation from its own body until it reports
/// [`Step::Done`], then uses the value.
pub fn await_task<C: IntoCoroutine>(body: C) -> C::Coroutine {
    body.into_coroutine()
}
