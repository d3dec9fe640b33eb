//! Deferred values settled from task bodies, with continuation scheduling.
//!
//! A [`Deferred`] starts *pending* and settles once, either *fulfilled* with a `T` or
//! *rejected* with an `E`. Settling again is silently ignored.
//!
//! Continuations registered with [`then`](Deferred::then), [`catch`](Deferred::catch) and
//! [`finally`](Deferred::finally) never run inside the call that settles the value. Settlement
//! admits a drain task at [`Priority::MICROTASK`] which runs them on a later scheduling step,
//! so a continuation always observes the already-settled state.
//!
//! ```ignore
//! use tickwork::{Runtime, future::Deferred};
//!
//! let rt = Runtime::new();
//! let price: Deferred<u32, String> = Deferred::pending(&rt);
//! let total = price.then(|p| Ok(p * 2));
//!
//! price.resolve_with(21);
//! rt.run_until_idle(8);
//! assert_eq!(total.outcome(), Some(Ok(42)));
//! ```
//!
//! A task body waits for a deferred by resuming [`wait`](Deferred::wait) (or by `.await`ing it
//! inside an `async` body adapted with [`from_future`](crate::task::from_future)); both poll
//! the state on every resumption and suspend while it is pending.

pub mod combine;

pub use combine::{
    Decision, Settled, all, all_settled, and, any, combine, or, race, timeout, xor,
};

use crate::error::TaskError;
use crate::priority;
use crate::runtime::Runtime;
use crate::task::{self, Coroutine, Step};

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Where a [`Deferred`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredState {
    Pending,
    Fulfilled,
    Rejected,
}

type Handler<T, E> = Box<dyn FnOnce(&Result<T, E>)>;

struct State<T, E> {
    outcome: Option<Result<T, E>>,
    // Position in the runtime's settlement order.
    settled_at: Option<u64>,
    handlers: Vec<Handler<T, E>>,
    drain_scheduled: bool,
}

/// A value that becomes available later.
///
/// Cloning yields another handle to the same value.
pub struct Deferred<T, E> {
    rt: Runtime,
    state: Rc<RefCell<State<T, E>>>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            rt: self.rt.clone(),
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_borrow() {
            Ok(state) => f
                .debug_struct("Deferred")
                .field("outcome", &state.outcome)
                .field("handlers", &state.handlers.len())
                .finish(),
            Err(_) => f.debug_struct("Deferred").finish_non_exhaustive(),
        }
    }
}

/// The settling half handed to a [`Deferred::new`] executor.
pub struct Resolver<T, E> {
    deferred: Deferred<T, E>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            deferred: self.deferred.clone(),
        }
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Fulfills the deferred. `false` if it had already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.deferred.resolve_with(value)
    }

    /// Rejects the deferred. `false` if it had already settled.
    pub fn reject(&self, reason: E) -> bool {
        self.deferred.reject_with(reason)
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Creates a deferred and runs `executor` immediately with its resolver.
    ///
    /// An `Err` returned by the executor rejects the deferred, unless the executor already
    /// settled it.
    pub fn new<F>(rt: &Runtime, executor: F) -> Self
    where
        F: FnOnce(&Resolver<T, E>) -> Result<(), E>,
    {
        let resolver = Resolver {
            deferred: Self::pending(rt),
        };

        if let Err(reason) = executor(&resolver) {
            resolver.reject(reason);
        }

        resolver.deferred
    }

    pub fn pending(rt: &Runtime) -> Self {
        Self {
            rt: rt.clone(),
            state: Rc::new(RefCell::new(State {
                outcome: None,
                settled_at: None,
                handlers: Vec::new(),
                drain_scheduled: false,
            })),
        }
    }

    pub fn resolved(rt: &Runtime, value: T) -> Self {
        let deferred = Self::pending(rt);
        deferred.resolve_with(value);
        deferred
    }

    pub fn rejected(rt: &Runtime, reason: E) -> Self {
        let deferred = Self::pending(rt);
        deferred.reject_with(reason);
        deferred
    }

    /// A resolver for this deferred, for settling it from elsewhere.
    pub fn resolver(&self) -> Resolver<T, E> {
        Resolver {
            deferred: self.clone(),
        }
    }

    /// Fulfills the deferred. `false` if it had already settled.
    pub fn resolve_with(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Rejects the deferred. `false` if it had already settled.
    pub fn reject_with(&self, reason: E) -> bool {
        self.settle(Err(reason))
    }

    /// Settles with `outcome` unless already settled.
    pub fn settle(&self, outcome: Result<T, E>) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome);
            state.settled_at = Some(self.rt.next_settle_seq());
        }

        self.schedule_drain();
        true
    }

    pub fn state(&self) -> DeferredState {
        match &self.state.borrow().outcome {
            None => DeferredState::Pending,
            Some(Ok(_)) => DeferredState::Fulfilled,
            Some(Err(_)) => DeferredState::Rejected,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.state.borrow().outcome.is_some()
    }

    /// A copy of the settled outcome, `None` while pending.
    pub fn outcome(&self) -> Option<Result<T, E>> {
        self.state.borrow().outcome.clone()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    /// Registers `handler` to run with the outcome once settled.
    ///
    /// The handler always runs from a drain task, never inside this call, even when the
    /// deferred has already settled.
    pub fn subscribe(&self, handler: impl FnOnce(&Result<T, E>) + 'static) {
        self.state.borrow_mut().handlers.push(Box::new(handler));
        self.schedule_drain();
    }

    /// Chains a computation on the fulfilled value. Rejections pass through.
    pub fn then<U, F>(&self, f: F) -> Deferred<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<U, E> + 'static,
    {
        let next = Deferred::pending(&self.rt);
        let target = next.clone();

        self.subscribe(move |outcome| {
            target.settle(match outcome {
                Ok(value) => f(value.clone()),
                Err(reason) => Err(reason.clone()),
            });
        });

        next
    }

    /// Chains a computation that produces another deferred, settling with its outcome.
    pub fn and_then<U, F>(&self, f: F) -> Deferred<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Deferred<U, E> + 'static,
    {
        let next = Deferred::pending(&self.rt);
        let target = next.clone();

        self.subscribe(move |outcome| match outcome {
            Ok(value) => {
                f(value.clone()).subscribe(move |inner| {
                    target.settle(inner.clone());
                });
            }
            Err(reason) => {
                target.settle(Err(reason.clone()));
            }
        });

        next
    }

    /// Recovers from a rejection. Fulfilled values pass through.
    pub fn catch<F>(&self, f: F) -> Deferred<T, E>
    where
        F: FnOnce(E) -> Result<T, E> + 'static,
    {
        let next = Deferred::pending(&self.rt);
        let target = next.clone();

        self.subscribe(move |outcome| {
            target.settle(match outcome {
                Ok(value) => Ok(value.clone()),
                Err(reason) => f(reason.clone()),
            });
        });

        next
    }

    /// Runs `f` once settled, either way, and passes the outcome through.
    pub fn finally<F>(&self, f: F) -> Deferred<T, E>
    where
        F: FnOnce() + 'static,
    {
        let next = Deferred::pending(&self.rt);
        let target = next.clone();

        self.subscribe(move |outcome| {
            f();
            target.settle(outcome.clone());
        });

        next
    }

    /// A computation that suspends until this deferred settles and finishes with its outcome.
    pub fn wait(&self) -> Wait<T, E> {
        Wait {
            state: Rc::clone(&self.state),
        }
    }

    pub(crate) fn settled_at(&self) -> Option<u64> {
        self.state.borrow().settled_at
    }

    fn schedule_drain(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.drain_scheduled || state.outcome.is_none() || state.handlers.is_empty() {
                return;
            }
            state.drain_scheduled = true;
        }

        let state = Rc::clone(&self.state);
        priority::queue_microtask(
            &self.rt,
            task::from_fn(move |rt| {
                drain(rt, &state);
                Ok(())
            }),
        );
    }
}

/// Runs every handler registered so far with a copy of the outcome.
///
/// A panicking handler is reported and skipped; the handlers after it still run.
fn drain<T: Clone, E: Clone>(rt: &Runtime, state: &RefCell<State<T, E>>) {
    let (outcome, handlers) = {
        let mut state = state.borrow_mut();
        state.drain_scheduled = false;
        (state.outcome.clone(), std::mem::take(&mut state.handlers))
    };

    let Some(outcome) = outcome else {
        return;
    };

    tracing::trace!(handlers = handlers.len(), "running deferred continuations");

    for handler in handlers {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(&outcome))) {
            let err = TaskError::from_panic(payload);
            tracing::warn!(error = %err, "deferred continuation panicked");
            rt.report_uncaught(&err, "in deferred continuation");
        }
    }
}

/// Computation returned by [`Deferred::wait`].
pub struct Wait<T, E> {
    state: Rc<RefCell<State<T, E>>>,
}

impl<T: Clone, E: Clone> Coroutine for Wait<T, E> {
    type Output = Result<T, E>;

    fn resume(&mut self, _rt: &Runtime) -> Result<Step<Result<T, E>>, TaskError> {
        Ok(match &self.state.borrow().outcome {
            Some(outcome) => Step::Done(outcome.clone()),
            None => Step::Yield,
        })
    }
}

/// Polls the state directly. Pending polls register no waker; the runtime resumes every
/// pending task anyway.
impl<T: Clone, E: Clone> std::future::Future for Deferred<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &self.state.borrow().outcome {
            Some(outcome) => Poll::Ready(outcome.clone()),
            None => Poll::Pending,
        }
    }
}
