//! Combinators over several deferreds, all expressed through one reducer.
//!
//! [`combine`] watches every input. Each time an input settles, its outcome is appended to the
//! list of settled records (settlement order, not input order) and the decision function is
//! asked what to do. The first non-[`Decision::Wait`] answer settles the output; later
//! settlements are ignored.
//!
//! Inputs that settled before the call are fed from a single microtask in the order they
//! settled, so a pending drain queued for another listener cannot reorder them.
//!
//! | combinator     | fulfills with                       | rejects with                          |
//! |----------------|-------------------------------------|---------------------------------------|
//! | [`all`]        | every value, input order            | the first rejection                   |
//! | [`any`]        | the first fulfillment               | every reason, input order             |
//! | [`race`]       | the first settlement, either way    | the first settlement, either way      |
//! | [`all_settled`]| every record, settlement order      | never                                 |
//! | [`or`]         | the first fulfillment               | the last rejection                    |
//! | [`xor`]        | the only fulfillment                | every outcome, input order            |
//! | [`and`]        | every value, input order            | every reason, input order             |

use crate::future::Deferred;
use crate::priority;
use crate::runtime::Runtime;
use crate::task;
use crate::time::set_timeout;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// What the reducer should do after an input settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision<U, F> {
    /// Keep waiting for more inputs.
    Wait,
    Resolve(U),
    Reject(F),
    /// Settle with an explicit outcome.
    Finish(Result<U, F>),
}

/// One settled input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled<T, E> {
    /// Position of the input in the list handed to the combinator.
    pub index: usize,
    pub outcome: Result<T, E>,
}

struct Reducer<T, E, D> {
    settled: Vec<Settled<T, E>>,
    total: usize,
    decide: D,
}

/// The generic reducer behind every combinator.
///
/// `decide` receives the records settled so far and whether every input has settled. With no
/// inputs it is called once, immediately, with an empty slice and `true`.
pub fn combine<T, E, U, F, D>(rt: &Runtime, inputs: Vec<Deferred<T, E>>, decide: D) -> Deferred<U, F>
where
    T: Clone + 'static,
    E: Clone + 'static,
    U: Clone + 'static,
    F: Clone + 'static,
    D: FnMut(&[Settled<T, E>], bool) -> Decision<U, F> + 'static,
{
    let output = Deferred::pending(rt);

    if inputs.is_empty() {
        let mut decide = decide;
        apply(&output, decide(&[], true));
        return output;
    }

    let reducer = Rc::new(RefCell::new(Reducer {
        settled: Vec::with_capacity(inputs.len()),
        total: inputs.len(),
        decide,
    }));
    let target = output.clone();
    let feed = Rc::new(move |index: usize, outcome: &Result<T, E>| {
        if target.is_settled() {
            return;
        }

        let decision = {
            let mut reducer = reducer.borrow_mut();
            let Reducer {
                settled,
                total,
                decide,
            } = &mut *reducer;

            settled.push(Settled {
                index,
                outcome: outcome.clone(),
            });
            let done = settled.len() == *total;
            decide(settled, done)
        };

        apply(&target, decision);
    });

    let mut early = Vec::new();
    for (index, input) in inputs.into_iter().enumerate() {
        match (input.settled_at(), input.outcome()) {
            (Some(seq), Some(outcome)) => early.push((seq, index, outcome)),
            _ => {
                let feed = Rc::clone(&feed);
                input.subscribe(move |outcome| feed(index, outcome));
            }
        }
    }

    if !early.is_empty() {
        early.sort_by_key(|(seq, index, _)| (*seq, *index));

        priority::queue_microtask(
            rt,
            task::from_fn(move |_| {
                for (_, index, outcome) in &early {
                    feed(*index, outcome);
                }
                Ok(())
            }),
        );
    }

    output
}

fn apply<U, F>(output: &Deferred<U, F>, decision: Decision<U, F>)
where
    U: Clone + 'static,
    F: Clone + 'static,
{
    match decision {
        Decision::Wait => {}
        Decision::Resolve(value) => {
            output.resolve_with(value);
        }
        Decision::Reject(reason) => {
            output.reject_with(reason);
        }
        Decision::Finish(outcome) => {
            output.settle(outcome);
        }
    }
}

fn in_input_order<T: Clone, E: Clone>(settled: &[Settled<T, E>]) -> Vec<Result<T, E>> {
    let mut records = settled.to_vec();
    records.sort_by_key(|record| record.index);
    records.into_iter().map(|record| record.outcome).collect()
}

/// Fulfills with every value once all fulfill; rejects with the first rejection.
pub fn all<T, E>(rt: &Runtime, inputs: Vec<Deferred<T, E>>) -> Deferred<Vec<T>, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    combine(rt, inputs, |settled, done| {
        if let Some(Settled {
            outcome: Err(reason),
            ..
        }) = settled.last()
        {
            return Decision::Reject(reason.clone());
        }

        if done {
            Decision::Resolve(in_input_order(settled).into_iter().flatten().collect())
        } else {
            Decision::Wait
        }
    })
}

/// Fulfills with the first fulfillment; rejects with every reason once all reject.
pub fn any<T, E>(rt: &Runtime, inputs: Vec<Deferred<T, E>>) -> Deferred<T, Vec<E>>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    combine(rt, inputs, |settled, done| {
        if let Some(Settled {
            outcome: Ok(value),
            ..
        }) = settled.last()
        {
            return Decision::Resolve(value.clone());
        }

        if done {
            Decision::Reject(
                in_input_order(settled)
                    .into_iter()
                    .filter_map(Result::err)
                    .collect(),
            )
        } else {
            Decision::Wait
        }
    })
}

/// Settles like whichever input settles first. Stays pending with no inputs.
pub fn race<T, E>(rt: &Runtime, inputs: Vec<Deferred<T, E>>) -> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    combine(rt, inputs, |settled, _| match settled.first() {
        Some(first) => Decision::Finish(first.outcome.clone()),
        None => Decision::Wait,
    })
}

/// Fulfills with every record, in settlement order, once all inputs settle.
pub fn all_settled<T, E>(rt: &Runtime, inputs: Vec<Deferred<T, E>>) -> Deferred<Vec<Settled<T, E>>, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    combine(rt, inputs, |settled, done| {
        if done {
            Decision::Resolve(settled.to_vec())
        } else {
            Decision::Wait
        }
    })
}

/// Fulfills with the first fulfillment; rejects with the last rejection if none fulfill.
/// Stays pending with no inputs.
pub fn or<T, E>(rt: &Runtime, inputs: Vec<Deferred<T, E>>) -> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    combine(rt, inputs, |settled, done| match settled.last() {
        Some(Settled {
            outcome: Ok(value),
            ..
        }) => Decision::Resolve(value.clone()),
        Some(Settled {
            outcome: Err(reason),
            ..
        }) if done => Decision::Reject(reason.clone()),
        _ => Decision::Wait,
    })
}

/// Fulfills if exactly one input fulfills; otherwise rejects with every outcome.
pub fn xor<T, E>(rt: &Runtime, inputs: Vec<Deferred<T, E>>) -> Deferred<T, Vec<Result<T, E>>>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    combine(rt, inputs, |settled, done| {
        if !done {
            return Decision::Wait;
        }

        let outcomes = in_input_order(settled);
        let mut values = outcomes
            .iter()
            .filter_map(|outcome| outcome.as_ref().ok())
            .cloned();
        let first = values.next();
        let second = values.next();

        match (first, second) {
            (Some(only), None) => Decision::Resolve(only),
            _ => Decision::Reject(outcomes),
        }
    })
}

/// Waits for every input; fulfills with every value if all fulfill, otherwise rejects with
/// every reason.
pub fn and<T, E>(rt: &Runtime, inputs: Vec<Deferred<T, E>>) -> Deferred<Vec<T>, Vec<E>>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    combine(rt, inputs, |settled, done| {
        if !done {
            return Decision::Wait;
        }

        let (values, reasons): (Vec<_>, Vec<_>) =
            in_input_order(settled).into_iter().partition(Result::is_ok);

        if reasons.is_empty() {
            Decision::Resolve(values.into_iter().flatten().collect())
        } else {
            Decision::Reject(reasons.into_iter().filter_map(Result::err).collect())
        }
    })
}

/// A deferred that fulfills with `value` once `delay` has elapsed.
pub fn timeout<T, E>(rt: &Runtime, delay: Duration, value: T) -> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    let deferred = Deferred::pending(rt);
    let resolver = deferred.resolver();

    set_timeout(
        rt,
        delay,
        task::from_fn(move |_| {
            resolver.resolve(value);
            Ok(())
        }),
    );

    deferred
}
