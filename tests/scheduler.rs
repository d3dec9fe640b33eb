use tickwork::priority::{critical, idle, next_tick, queue_microtask};
use tickwork::runtime::Control;
use tickwork::task::{await_task, from_fn, lazy, poll_fn, ready};
use tickwork::{
    Coroutine, Error, IterationCounts, Priority, Runtime, RuntimeBuilder, Step, TaskError, TaskId,
};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Log = Rc<RefCell<Vec<&'static str>>>;
type Reports = Rc<RefCell<Vec<(String, String, String)>>>;

/// A task that records `name` on every resumption and never finishes.
fn forever(log: &Log, name: &'static str) -> impl Coroutine<Output = ()> + 'static {
    let log = Rc::clone(log);
    poll_fn(move |_| {
        log.borrow_mut().push(name);
        Ok(Step::Yield)
    })
}

/// A task that records `name` and finishes in one step.
fn once(log: &Log, name: &'static str) -> impl Coroutine<Output = ()> + 'static {
    let log = Rc::clone(log);
    from_fn(move |_| {
        log.borrow_mut().push(name);
        Ok(())
    })
}

/// A task that records `name` on each of `steps` resumptions, finishing on the last.
fn steps(log: &Log, name: &'static str, steps: usize) -> impl Coroutine<Output = ()> + 'static {
    let log = Rc::clone(log);
    let mut left = steps;
    poll_fn(move |_| {
        log.borrow_mut().push(name);
        left -= 1;
        Ok(if left == 0 { Step::Done(()) } else { Step::Yield })
    })
}

fn recording_runtime() -> (Runtime, Reports) {
    let reports: Reports = Rc::default();
    let sink = Rc::clone(&reports);

    let rt = RuntimeBuilder::new()
        .reporter(move |name: &str, message: &str, trace: &str| {
            sink.borrow_mut()
                .push((name.to_string(), message.to_string(), trace.to_string()));
        })
        .build();

    (rt, reports)
}

#[test]
fn test_round_robin_in_admission_order() {
    let rt = Runtime::new();
    let log = Log::default();
    let names = ["t0", "t1", "t2", "t3", "t4"];

    for name in names {
        rt.spawn(once(&log, name));
    }

    for _ in 0..names.len() {
        rt.tick();
        assert_eq!(
            rt.iteration_counts().per_tick,
            1,
            "Each tick should resume exactly one task"
        );
    }

    assert_eq!(*log.borrow(), names, "Tasks should run once, in admission order");
    assert!(rt.is_idle());
}

#[test]
fn test_multi_step_tasks_interleave() {
    let rt = Runtime::new();
    let log = Log::default();

    rt.spawn(steps(&log, "a", 3));
    rt.spawn(steps(&log, "b", 3));

    let ticks = rt.run_until_idle(20);

    assert_eq!(ticks, 6);
    assert_eq!(*log.borrow(), ["a", "b", "a", "b", "a", "b"]);
}

#[test]
fn test_higher_priority_runs_first() {
    let rt = Runtime::new();
    let log = Log::default();

    rt.spawn(forever(&log, "low"));
    rt.admit(steps(&log, "high", 3), 5);

    for _ in 0..5 {
        rt.tick();
    }

    assert_eq!(
        *log.borrow(),
        ["high", "high", "high", "low", "low"],
        "Pending high-priority work should always be selected first"
    );
}

#[test]
fn test_admitted_task_waits_for_the_next_step() {
    let rt = Runtime::new();
    let log = Log::default();
    let child_log = Rc::clone(&log);

    rt.spawn(from_fn(move |rt| {
        child_log.borrow_mut().push("parent");
        rt.admit(once(&child_log, "child"), Priority::MAXIMUM);
        Ok(())
    }));

    rt.tick();
    assert_eq!(*log.borrow(), ["parent"]);

    rt.tick();
    assert_eq!(*log.borrow(), ["parent", "child"]);
}

#[test]
fn test_transient_same_task_is_one_shot() {
    let rt = Runtime::new();
    let log = Log::default();
    let a_log = Rc::clone(&log);
    let mut first = true;

    rt.spawn(poll_fn(move |rt| {
        a_log.borrow_mut().push("a");
        if first {
            first = false;
            rt.request_same_task(false);
        }
        Ok(Step::<()>::Yield)
    }));
    rt.spawn(forever(&log, "b"));

    for _ in 0..4 {
        rt.tick();
    }

    assert_eq!(*log.borrow(), ["a", "a", "b", "a"]);
}

#[test]
fn test_permanent_same_task_holds_until_cleared() {
    let rt = Runtime::new();
    let log = Log::default();
    let a_log = Rc::clone(&log);
    let mut resumes = 0;

    rt.spawn(poll_fn(move |rt| {
        a_log.borrow_mut().push("a");
        resumes += 1;
        match resumes {
            1 => rt.request_same_task(true),
            3 => rt.clear_control(true),
            _ => {}
        }
        Ok(Step::<()>::Yield)
    }));
    rt.spawn(forever(&log, "b"));

    for _ in 0..5 {
        rt.tick();
    }

    assert_eq!(*log.borrow(), ["a", "a", "a", "b", "a"]);
    assert_eq!(rt.permanent_control(), Control::default());
}

#[test]
fn test_transient_request_replaces_permanent_pair() {
    let rt = Runtime::new();
    let log = Log::default();
    let a_log = Rc::clone(&log);
    let mut first = true;

    rt.request_same_task(true);
    rt.spawn(poll_fn(move |rt| {
        a_log.borrow_mut().push("a");
        if first {
            first = false;
            // Transient continue only: this step does not ask for the same task.
            rt.request_continue_tick(false);
        }
        Ok(Step::<()>::Yield)
    }));
    rt.spawn(forever(&log, "b"));

    rt.tick();

    assert_eq!(
        *log.borrow(),
        ["a", "b"],
        "The transient pair should decide alone: continue, but move on"
    );
}

#[test]
fn test_continue_tick_runs_more_steps() {
    let rt = Runtime::new();
    let log = Log::default();
    let first_log = Rc::clone(&log);

    rt.spawn(from_fn(move |rt| {
        first_log.borrow_mut().push("first");
        rt.request_continue_tick(false);
        Ok(())
    }));
    rt.spawn(once(&log, "second"));
    rt.spawn(once(&log, "third"));

    rt.tick();
    assert_eq!(*log.borrow(), ["first", "second"]);
    assert_eq!(rt.iteration_counts().per_tick, 2);

    rt.tick();
    assert_eq!(*log.borrow(), ["first", "second", "third"]);
    assert_eq!(rt.iteration_counts().per_tick, 1);
}

#[test]
fn test_failing_task_does_not_abort_the_tick() {
    let (rt, reports) = recording_runtime();
    let log = Log::default();

    rt.request_continue_tick(true);
    let failing = rt.spawn(from_fn(|_| {
        Err::<(), _>(TaskError::named("RangeError", "out of range"))
    }));
    rt.spawn(once(&log, "survivor"));

    rt.tick();

    assert_eq!(*log.borrow(), ["survivor"], "Next task should run in the same tick");
    assert!(!rt.contains(failing), "Failed task should be removed");
    assert_eq!(rt.iteration_counts().per_tick, 2);

    let reports = reports.borrow();
    assert_eq!(reports.len(), 1);
    let (name, message, trace) = &reports[0];
    assert_eq!(name, "RangeError");
    assert_eq!(message, "out of range");
    assert!(
        trace.contains(&format!("at task {failing}")),
        "Trace should name the failing task: {trace}"
    );
}

#[test]
fn test_panicking_task_is_reported() {
    let (rt, reports) = recording_runtime();

    rt.spawn(poll_fn(|_| -> Result<Step<()>, TaskError> { panic!("kaboom") }));
    rt.tick();

    assert!(rt.is_idle(), "Panicked task should be removed");
    let reports = reports.borrow();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "Panic");
    assert_eq!(reports[0].1, "kaboom");
}

#[test]
fn test_current_task_id_only_inside_a_resumption() {
    let rt = Runtime::new();
    let seen = Rc::new(Cell::new(None));
    let slot = Rc::clone(&seen);

    assert!(matches!(rt.current_task_id(), Err(Error::NoCurrentTask)));

    let id = rt.spawn(from_fn(move |rt| {
        slot.set(Some(rt.current_task_id()?));
        Ok(())
    }));
    rt.tick();

    assert_eq!(seen.get(), Some(id));
    assert!(matches!(rt.current_task_id(), Err(Error::NoCurrentTask)));
}

#[test]
fn test_idle_tick_counts() {
    let rt = Runtime::new();

    rt.tick_once().unwrap();
    rt.tick_once().unwrap();

    assert_eq!(
        rt.iteration_counts(),
        IterationCounts {
            per_tick: 0,
            per_scheduler: 2,
        }
    );
}

#[test]
fn test_tick_inside_a_task_is_rejected() {
    let rt = Runtime::new();
    let seen = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&seen);

    rt.spawn(from_fn(move |rt| {
        *slot.borrow_mut() = Some(rt.tick_once());
        Ok(())
    }));
    rt.tick_once().unwrap();

    let inner = seen.borrow_mut().take().expect("task should have run");
    assert!(matches!(inner, Err(Error::ReentrantTick)));
    assert_eq!(rt.iteration_counts().per_scheduler, 1);
}

#[test]
fn test_stats_reflect_the_store() {
    let rt = Runtime::new();
    let log = Log::default();

    let top = rt.admit(forever(&log, "top"), 5);
    rt.spawn(forever(&log, "mid"));
    rt.admit(forever(&log, "low"), -3);
    rt.spawn(forever(&log, "mid"));

    let stats = rt.stats();
    assert_eq!(stats.priorities, vec![Priority(5), Priority(0), Priority(-3)]);
    assert_eq!(stats.current, None);
    assert_eq!(stats.next_id, TaskId::from_raw(5));

    rt.tick();
    assert_eq!(rt.stats().current, Some(top));

    rt.cancel(top);
    let stats = rt.stats();
    assert_eq!(stats.priorities, vec![Priority(0), Priority(-3)]);
    assert_eq!(stats.current, None, "Removing the current task clears it");
}

#[test]
fn test_cancel_is_immediate() {
    let rt = Runtime::new();
    let log = Log::default();

    let a = rt.spawn(forever(&log, "a"));
    rt.spawn(forever(&log, "b"));

    assert!(rt.cancel(a));
    assert!(!rt.cancel(a), "Second cancel should find nothing");

    rt.tick();
    rt.tick();
    assert_eq!(*log.borrow(), ["b", "b"]);
}

#[test]
fn test_task_can_cancel_itself() {
    let rt = Runtime::new();
    let log = Log::default();
    let own_log = Rc::clone(&log);

    let id = rt.spawn(poll_fn(move |rt| {
        own_log.borrow_mut().push("self");
        let me = rt.current_task_id()?;
        rt.cancel(me);
        Ok(Step::<()>::Yield)
    }));

    rt.tick();
    rt.tick();

    assert!(!rt.contains(id));
    assert_eq!(*log.borrow(), ["self"], "Cancelled task should never resume again");
}

#[test]
fn test_priority_helpers_order() {
    let rt = Runtime::new();
    let log = Log::default();

    idle(&rt, once(&log, "idle"));
    rt.spawn(once(&log, "default"));
    queue_microtask(&rt, once(&log, "microtask"));
    next_tick(&rt, once(&log, "next_tick"));
    critical(&rt, once(&log, "critical"));

    rt.run_until_idle(10);

    assert_eq!(
        *log.borrow(),
        ["critical", "next_tick", "microtask", "default", "idle"]
    );
}

#[test]
fn test_lazy_callable_finishes_in_one_step() {
    let rt = Runtime::new();

    let value = rt.block_on(lazy(|_| ready(5))).unwrap();

    assert_eq!(value, 5);
    assert_eq!(rt.iteration_counts().per_scheduler, 1);
}

#[test]
fn test_completed_computation_cannot_resume() {
    let rt = Runtime::new();
    let mut value = ready(1);

    assert_eq!(value.resume(&rt).unwrap(), Step::Done(1));
    assert!(value.resume(&rt).is_err());
}

#[test]
fn test_await_task_drives_a_sub_computation() {
    let rt = Runtime::new();
    let mut left = 2;
    let mut sub = await_task(poll_fn(move |_| {
        if left == 0 {
            return Ok(Step::Done(7));
        }
        left -= 1;
        Ok(Step::Yield)
    }));

    let doubled = rt
        .block_on(poll_fn(move |rt| Ok(sub.resume(rt)?.map(|value| value * 2))))
        .unwrap();

    assert_eq!(doubled, 14);
}
