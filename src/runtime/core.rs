//! The scheduler engine behind every [`Runtime`] handle.
//!
//! A host drives the runtime by calling [`Runtime::tick`] on its own cadence. Each tick runs
//! one or more scheduling steps; a step selects a task, resumes its body by one suspend point
//! and applies the control flags the body left behind.
//!
//! # Borrowing
//!
//! Task bodies receive the runtime handle and call back into it (admit, cancel, control
//! requests). The engine therefore never holds a borrow of its state while a body, an
//! interceptor or the reporter runs: the body is taken out of its slot for the duration of
//! the resumption and put back afterwards.

use crate::error::{Error, Result, TaskError};
use crate::priority::Priority;
use crate::report::{ErrorReport, TracingReport};
use crate::runtime::control::{Control, ControlState};
use crate::runtime::overrides::{LayerId, Operation, OverrideRegistry, ops};
use crate::runtime::store::TaskStore;
use crate::task::{self, BoxedTask, Coroutine, IntoCoroutine, Step, TaskId};
use crate::time::{Clock, SystemClock};

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;

/// Snapshot of the scheduler's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    /// Priorities with at least one pending task, highest first.
    pub priorities: Vec<Priority>,
    /// The most recently resumed task, while it is still pending.
    pub current: Option<TaskId>,
    /// Id the next admitted task will receive.
    pub next_id: TaskId,
}

/// Scheduling counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationCounts {
    /// Scheduling steps run by the latest (or running) tick.
    pub per_tick: u64,
    /// Ticks completed over the runtime's lifetime, idle ticks included.
    pub per_scheduler: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Config {
    pub(crate) max_steps_per_tick: Option<usize>,
}

struct Core {
    // A slot is `None` while its body is being resumed.
    store: TaskStore<Option<BoxedTask>>,
    control: ControlState,
    current: Option<TaskId>,
    running: Option<TaskId>,
    counts: IterationCounts,
    ticking: bool,
}

struct Shared {
    core: RefCell<Core>,
    overrides: RefCell<OverrideRegistry>,
    reporter: Box<dyn ErrorReport>,
    clock: Box<dyn Clock>,
    config: Config,
    // Orders deferred settlements made through this runtime.
    settle_seq: Cell<u64>,
}

/// Handle to a cooperative, single-threaded task runtime.
///
/// Cloning is cheap and every clone drives the same scheduler. Independent runtimes share
/// nothing, so tests can build as many as they like.
///
/// # Example
/// ```ignore
/// use tickwork::{Runtime, task};
///
/// let rt = Runtime::new();
/// rt.admit(task::from_fn(|_| Ok(println!("urgent"))), 10);
/// rt.spawn(task::from_fn(|_| Ok(println!("later"))));
///
/// rt.tick(); // urgent
/// rt.tick(); // later
/// ```
#[derive(Clone)]
pub struct Runtime {
    shared: Rc<Shared>,
}

impl Runtime {
    /// Creates a runtime with the default reporter and the system clock.
    pub fn new() -> Self {
        Self::from_parts(
            Box::new(TracingReport),
            Box::new(SystemClock::new()),
            Config::default(),
        )
    }

    /// Starts configuring a runtime.
    pub fn builder() -> crate::RuntimeBuilder {
        crate::RuntimeBuilder::new()
    }

    pub(crate) fn from_parts(
        reporter: Box<dyn ErrorReport>,
        clock: Box<dyn Clock>,
        config: Config,
    ) -> Self {
        let core = Core {
            store: TaskStore::new(),
            control: ControlState::default(),
            current: None,
            running: None,
            counts: IterationCounts::default(),
            ticking: false,
        };

        Self {
            shared: Rc::new(Shared {
                core: RefCell::new(core),
                overrides: RefCell::new(OverrideRegistry::new()),
                reporter,
                clock,
                config,
                settle_seq: Cell::new(0),
            }),
        }
    }

    /// Admits `task` at `priority` and returns its id.
    ///
    /// The task is normalized through [`IntoCoroutine`]; it first runs on a later scheduling
    /// step, never inside this call.
    pub fn admit<C>(&self, task: C, priority: impl Into<Priority>) -> TaskId
    where
        C: IntoCoroutine,
        C::Coroutine: 'static,
    {
        let args = (task::boxed(task), priority.into());

        self.dispatch::<ops::Admit>(args, |(body, priority)| self.store_admit(body, priority))
    }

    /// Admits `task` at the default priority.
    pub fn spawn<C>(&self, task: C) -> TaskId
    where
        C: IntoCoroutine,
        C::Coroutine: 'static,
    {
        self.admit(task, Priority::DEFAULT)
    }

    /// Removes a pending task immediately. Returns `false` if `id` was not pending.
    ///
    /// A task may cancel itself; its current resumption still finishes but it is never
    /// resumed again.
    pub fn cancel(&self, id: TaskId) -> bool {
        self.dispatch::<ops::Cancel>(id, |id| self.store_remove(id))
    }

    /// Asks for the running task to be resumed again on the next step.
    ///
    /// A transient request applies to the end of the current step only; a permanent one
    /// holds until cleared.
    pub fn request_same_task(&self, permanent: bool) {
        self.dispatch::<ops::RequestSameTask>(permanent, |permanent| {
            self.shared
                .core
                .borrow_mut()
                .control
                .request_same_task(permanent)
        })
    }

    /// Asks for another scheduling step inside the current tick.
    pub fn request_continue_tick(&self, permanent: bool) {
        self.dispatch::<ops::RequestContinueTick>(permanent, |permanent| {
            self.shared
                .core
                .borrow_mut()
                .control
                .request_continue_tick(permanent)
        })
    }

    /// Resets the permanent or the transient control requests to neutral.
    pub fn clear_control(&self, permanent: bool) {
        self.dispatch::<ops::ClearControl>(permanent, |permanent| {
            self.shared.core.borrow_mut().control.clear(permanent)
        })
    }

    /// The permanent control pair currently in force.
    pub fn permanent_control(&self) -> Control {
        self.shared.core.borrow().control.permanent()
    }

    /// Id of the task being resumed.
    ///
    /// Fails with [`Error::NoCurrentTask`] outside of a resumption.
    pub fn current_task_id(&self) -> Result<TaskId> {
        self.dispatch::<ops::CurrentTaskId>((), |()| {
            self.shared
                .core
                .borrow()
                .running
                .ok_or(Error::NoCurrentTask)
        })
    }

    /// Runs one tick.
    ///
    /// Fails with [`Error::ReentrantTick`] when called from inside a running tick. Task
    /// failures never fail the tick; they are reported and the task is dropped.
    pub fn tick_once(&self) -> Result<()> {
        self.dispatch::<ops::TickOnce>((), |()| self.run_tick())
    }

    /// Host entry point: runs one tick and reports any failure instead of returning it.
    pub fn tick(&self) {
        if let Err(err) = self.tick_once() {
            tracing::warn!(error = %err, "tick failed");
            self.shared
                .reporter
                .report("SchedulerError", &err.to_string(), "");
        }
    }

    pub fn stats(&self) -> Stats {
        self.dispatch::<ops::Stats>((), |()| {
            let core = self.shared.core.borrow();
            Stats {
                priorities: core.store.priorities().to_vec(),
                current: core.current,
                next_id: core.store.next_id(),
            }
        })
    }

    pub fn iteration_counts(&self) -> IterationCounts {
        self.dispatch::<ops::IterationCounts>((), |()| self.shared.core.borrow().counts)
    }

    /// Whether `id` is still pending.
    pub fn contains(&self, id: TaskId) -> bool {
        self.shared.core.borrow().store.contains(id)
    }

    /// Number of pending tasks.
    pub fn pending(&self) -> usize {
        self.shared.core.borrow().store.len()
    }

    pub fn is_idle(&self) -> bool {
        self.shared.core.borrow().store.is_empty()
    }

    /// Time read from the configured clock.
    pub fn now(&self) -> Duration {
        self.shared.clock.now()
    }

    /// Admits `body` and ticks until it produces a value.
    ///
    /// A failing body returns [`Error::TaskFailed`] instead of reaching the reporter. If the
    /// body is cancelled before it finishes the call returns [`Error::Stalled`]. Like any
    /// tick, this must not be called from inside a task.
    pub fn block_on<C>(&self, body: C) -> Result<C::Output>
    where
        C: IntoCoroutine,
        C::Coroutine: 'static,
        C::Output: 'static,
    {
        let slot: Rc<RefCell<Option<std::result::Result<C::Output, TaskError>>>> =
            Rc::new(RefCell::new(None));
        let out = Rc::clone(&slot);
        let mut inner = body.into_coroutine();

        let id = self.spawn(task::poll_fn(move |rt| {
            let outcome = match inner.resume(rt) {
                Ok(Step::Yield) => return Ok(Step::Yield),
                Ok(Step::Done(value)) => Ok(value),
                Err(err) => Err(err),
            };
            *out.borrow_mut() = Some(outcome);
            Ok(Step::Done(()))
        }));

        loop {
            if let Some(outcome) = slot.borrow_mut().take() {
                return outcome.map_err(Error::TaskFailed);
            }

            if !self.contains(id) {
                return Err(Error::Stalled(id));
            }

            if let Err(err) = self.tick_once() {
                // The caller sees the failure, so the body must not run later.
                self.cancel(id);
                return Err(err);
            }
        }
    }

    /// Ticks until no task is pending or `max_ticks` ticks ran. Returns the ticks run.
    pub fn run_until_idle(&self, max_ticks: u64) -> u64 {
        let mut ticks = 0;

        while ticks < max_ticks && !self.is_idle() {
            self.tick();
            ticks += 1;
        }

        ticks
    }

    /// Cancels every pending task, lowest id first.
    ///
    /// Tasks hold runtime handles, so shutting down is also what releases a runtime that
    /// still has pending work.
    pub fn shutdown(&self) {
        let mut ids = self.shared.core.borrow().store.ids();
        ids.sort_unstable();

        tracing::debug!(pending = ids.len(), "runtime shutting down");

        for id in ids {
            self.cancel(id);
        }
    }

    /// Installs an interceptor for operation `O` under `layer`.
    pub fn register_override<O, F>(&self, layer: impl Into<LayerId>, hook: F) -> Result<()>
    where
        O: Operation,
        F: Fn(&mut dyn FnMut(O::Args) -> O::Output, O::Args) -> O::Output + 'static,
    {
        self.shared
            .overrides
            .borrow_mut()
            .register::<O, F>(layer, hook)
    }

    /// Removes every interceptor `layer` installed. Returns how many were removed.
    pub fn unregister_layer(&self, layer: impl Into<LayerId>) -> usize {
        self.shared.overrides.borrow_mut().unregister(&layer.into())
    }

    /// The layer whose interceptor currently wins for the operation `name`.
    pub fn intercepting_layer(&self, name: &str) -> Option<LayerId> {
        self.shared
            .overrides
            .borrow()
            .intercepting_layer(name)
            .cloned()
    }

    pub fn is_layer_installed(&self, layer: &LayerId) -> bool {
        self.shared.overrides.borrow().is_installed(layer)
    }

    /// Runs `original`, or the interceptor registered for `O` in its place.
    fn dispatch<O: Operation>(
        &self,
        args: O::Args,
        mut original: impl FnMut(O::Args) -> O::Output,
    ) -> O::Output {
        let interceptor = self.shared.overrides.borrow().lookup::<O>();

        match interceptor {
            Some(interceptor) => interceptor.call(&mut original, args),
            None => original(args),
        }
    }

    fn store_admit(&self, body: BoxedTask, priority: Priority) -> TaskId {
        self.dispatch::<ops::StoreAdmit>((body, priority), |(body, priority)| {
            let id = self
                .shared
                .core
                .borrow_mut()
                .store
                .admit(Some(body), priority);
            tracing::debug!(task = %id, %priority, "task admitted");
            id
        })
    }

    /// Every removal (cancel, completion, failure) goes through here.
    fn store_remove(&self, id: TaskId) -> bool {
        self.dispatch::<ops::StoreRemove>(id, |id| {
            let removed = {
                let mut core = self.shared.core.borrow_mut();
                if core.current == Some(id) {
                    core.current = None;
                }
                core.store.remove(id)
            };

            // The body is dropped here, outside the borrow.
            let found = removed.is_some();
            if found {
                tracing::debug!(task = %id, "task removed");
            }
            found
        })
    }

    fn run_tick(&self) -> Result<()> {
        {
            let mut core = self.shared.core.borrow_mut();
            if core.ticking {
                return Err(Error::ReentrantTick);
            }
            core.ticking = true;
            core.counts.per_tick = 0;
        }
        let _guard = TickGuard(self);

        let max_steps = self.shared.config.max_steps_per_tick;
        let mut steps = 0usize;

        while let Some((id, priority, mut body)) = self.begin_step() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| body.resume(self)))
                .unwrap_or_else(|payload| Err(TaskError::from_panic(payload)));
            steps += 1;

            let resolved = self.finish_step(id, priority, body, outcome);

            if !resolved.continue_tick {
                break;
            }
            if max_steps.is_some_and(|max| steps >= max) {
                tracing::trace!(steps, "step budget exhausted");
                break;
            }
        }

        Ok(())
    }

    /// Selects the next task and takes its body out of the store.
    fn begin_step(&self) -> Option<(TaskId, Priority, BoxedTask)> {
        let mut core = self.shared.core.borrow_mut();
        let core = &mut *core;

        let carried = core.control.take_carried();
        let preferred = if carried.same_task { core.current } else { None };

        let id = core.store.select(preferred)?;
        let priority = core.store.priority_of(id)?;
        let body = core.store.get_mut(id)?.take()?;

        core.current = Some(id);
        core.running = Some(id);

        tracing::trace!(task = %id, %priority, "resuming task");

        Some((id, priority, body))
    }

    /// Applies the outcome of a resumption and resolves the control flags.
    fn finish_step(
        &self,
        id: TaskId,
        priority: Priority,
        body: BoxedTask,
        outcome: std::result::Result<Step<()>, TaskError>,
    ) -> Control {
        let resolved = {
            let mut core = self.shared.core.borrow_mut();
            core.running = None;
            core.counts.per_tick += 1;
            core.control.resolve()
        };

        match outcome {
            Ok(Step::Yield) => {
                let orphan = {
                    let mut core = self.shared.core.borrow_mut();
                    match core.store.get_mut(id) {
                        Some(slot) => {
                            *slot = Some(body);
                            if !resolved.same_task {
                                core.store.advance_past(id);
                            }
                            None
                        }
                        // Cancelled itself while running.
                        None => Some(body),
                    }
                };
                drop(orphan);
            }
            Ok(Step::Done(())) => {
                drop(body);
                self.store_remove(id);
            }
            Err(err) => {
                drop(body);
                self.store_remove(id);
                self.report_failure(id, priority, &err);
            }
        }

        resolved
    }

    /// Next number in this runtime's settlement order.
    pub(crate) fn next_settle_seq(&self) -> u64 {
        let next = self.shared.settle_seq.get() + 1;
        self.shared.settle_seq.set(next);
        next
    }

    /// Hands a failure nobody else handled to the reporter, tagged with where it happened.
    pub(crate) fn report_uncaught(&self, err: &TaskError, location: &str) {
        let trace = if err.trace().is_empty() {
            location.to_string()
        } else {
            format!("{}\n{location}", err.trace())
        };

        self.shared
            .reporter
            .report(err.name(), err.message(), &trace);
    }

    fn report_failure(&self, id: TaskId, priority: Priority, err: &TaskError) {
        tracing::warn!(task = %id, %priority, error = %err, "task failed");

        self.report_uncaught(err, &format!("at task {id} (priority {priority})"));
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.shared.core.try_borrow() {
            Ok(core) => f
                .debug_struct("Runtime")
                .field("pending", &core.store.len())
                .field("current", &core.current)
                .field("counts", &core.counts)
                .finish(),
            Err(_) => f.debug_struct("Runtime").finish_non_exhaustive(),
        }
    }
}

/// Closes a tick even if a reporter or interceptor unwinds through it.
struct TickGuard<'a>(&'a Runtime);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut core) = self.0.shared.core.try_borrow_mut() {
            core.ticking = false;
            core.running = None;
            core.counts.per_scheduler += 1;
        }
    }
}
