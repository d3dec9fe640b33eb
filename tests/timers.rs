use tickwork::task::{from_fn, poll_fn};
use tickwork::time::wrapper::Timed;
use tickwork::time::{
    ManualClock, TimeError, clear_interval, clear_timeout, set_interval, set_timeout, sleep,
    sleep_ms, timeout,
};
use tickwork::{Coroutine, IntoCoroutine, Runtime, RuntimeBuilder, Step};

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

fn manual_runtime() -> (Runtime, ManualClock) {
    let clock = ManualClock::new();
    let rt = RuntimeBuilder::new().clock(clock.clone()).build();
    (rt, clock)
}

/// Spawns `body` and stores its output once it finishes.
fn drive<C>(rt: &Runtime, body: C) -> Rc<RefCell<Option<C::Output>>>
where
    C: IntoCoroutine,
    C::Coroutine: 'static,
    C::Output: 'static,
{
    let slot = Rc::new(RefCell::new(None));
    let out = Rc::clone(&slot);
    let mut inner = body.into_coroutine();

    rt.spawn(poll_fn(move |rt| {
        Ok(match inner.resume(rt)? {
            Step::Yield => Step::Yield,
            Step::Done(value) => {
                *out.borrow_mut() = Some(value);
                Step::Done(())
            }
        })
    }));

    slot
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[test]
fn test_sleep_waits_for_the_clock() {
    let (rt, clock) = manual_runtime();
    let done = drive(&rt, sleep(ms(10)));

    rt.tick();
    assert!(done.borrow().is_none(), "Start time is captured on the first step");

    clock.advance(ms(9));
    rt.tick();
    assert!(done.borrow().is_none());

    clock.advance(ms(1));
    rt.tick();
    assert_eq!(*done.borrow(), Some(()));
}

#[test]
fn test_zero_sleep_finishes_immediately() {
    let (rt, _clock) = manual_runtime();
    let done = drive(&rt, sleep_ms(0));

    rt.tick();

    assert_eq!(*done.borrow(), Some(()));
    assert!(rt.is_idle());
}

#[test]
fn test_set_timeout_fires_once() {
    let (rt, clock) = manual_runtime();
    let fired = Rc::new(Cell::new(0));
    let counter = Rc::clone(&fired);

    set_timeout(
        &rt,
        ms(5),
        from_fn(move |_| {
            counter.set(counter.get() + 1);
            Ok(())
        }),
    );

    rt.tick();
    clock.advance(ms(5));
    rt.tick();
    rt.tick();

    assert_eq!(fired.get(), 1);
    assert!(rt.is_idle(), "A timeout is removed once it has run");
}

#[test]
fn test_clear_timeout_prevents_the_callback() {
    let (rt, clock) = manual_runtime();
    let fired = Rc::new(Cell::new(false));
    let flag = Rc::clone(&fired);

    let timer = set_timeout(
        &rt,
        ms(5),
        from_fn(move |_| {
            flag.set(true);
            Ok(())
        }),
    );
    rt.tick();

    assert!(clear_timeout(&rt, timer));
    assert!(!clear_timeout(&rt, timer), "Already cleared");

    clock.advance(ms(10));
    rt.run_until_idle(5);
    assert!(!fired.get());
}

#[test]
fn test_interval_repeats_until_cleared() {
    let (rt, clock) = manual_runtime();
    let runs = Rc::new(Cell::new(0));
    let counter = Rc::clone(&runs);

    let timer = set_interval(&rt, ms(10), move || {
        let counter = Rc::clone(&counter);
        from_fn(move |_| {
            counter.set(counter.get() + 1);
            Ok(())
        })
    });

    rt.tick();
    for _ in 0..3 {
        clock.advance(ms(10));
        rt.tick();
    }
    assert_eq!(runs.get(), 3, "One run per elapsed period");

    rt.tick();
    assert_eq!(runs.get(), 3, "No run before the next period elapses");

    assert!(clear_interval(&rt, timer));
    clock.advance(ms(50));
    rt.run_until_idle(5);
    assert_eq!(runs.get(), 3);
}

#[test]
fn test_timeout_expires() {
    let (rt, clock) = manual_runtime();
    let outcome = drive(&rt, timeout(ms(10), sleep(ms(100))));

    rt.tick();
    clock.advance(ms(10));
    rt.tick();

    assert_eq!(*outcome.borrow(), Some(Err(TimeError::TimeOut)));
}

#[test]
fn test_timeout_finishes_in_time() {
    let (rt, clock) = manual_runtime();
    let mut steps = 0;
    let outcome = drive(
        &rt,
        timeout(
            ms(10),
            poll_fn(move |_| {
                steps += 1;
                Ok(if steps == 2 { Step::Done("ok") } else { Step::Yield })
            }),
        ),
    );

    rt.tick();
    clock.advance(ms(5));
    rt.tick();

    assert_eq!(*outcome.borrow(), Some(Ok("ok")));
}

#[test]
fn test_timed_reports_elapsed_clock_time() {
    let (rt, clock) = manual_runtime();
    let outcome = drive(&rt, Timed::new(sleep(ms(30))));

    rt.tick();
    clock.advance(ms(45));
    rt.tick();

    assert_eq!(*outcome.borrow(), Some(((), ms(45))));
}

#[test]
fn test_sleep_on_the_system_clock() {
    let rt = Runtime::new();

    let slept = rt.block_on(Timed::new(sleep_ms(1))).unwrap();

    assert!(slept.1 >= ms(1), "Sleep should last at least its duration");
}
