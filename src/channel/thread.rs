//! Spawn a child task and join on its result through the caller's mailbox.

use crate::channel::mailbox::{Mailboxes, Target};
use crate::error::TaskError;
use crate::priority::Priority;
use crate::runtime::Runtime;
use crate::task::{Coroutine, IntoCoroutine, Step, TaskId};

use std::panic::{self, AssertUnwindSafe};

/// Message types that can carry the result of a joined child.
///
/// A child that fails still delivers a message, built from its error, so the join never
/// waits forever.
pub trait Joinable<T> {
    fn from_join(result: Result<T, TaskError>) -> Self;
}

impl<T> Joinable<T> for Result<T, TaskError> {
    fn from_join(result: Result<T, TaskError>) -> Self {
        result
    }
}

impl<M: Clone + 'static> Mailboxes<M> {
    /// Runs `body` in a child task and suspends the caller until its result arrives.
    ///
    /// The returned computation must be resumed from inside a task: on its first resumption
    /// it opens the caller's mailbox and admits the child; it then polls the mailbox on every
    /// resumption and finishes with the first message, closing the mailbox.
    ///
    /// ```ignore
    /// let boxes: Mailboxes<Result<u32, TaskError>> = Mailboxes::install(&rt)?;
    /// let joined = rt.block_on(boxes.exec(task::ready(42)))?;
    /// assert_eq!(joined, Ok(42));
    /// ```
    pub fn exec<C>(&self, body: C) -> Exec<M, C::Coroutine>
    where
        C: IntoCoroutine,
        C::Coroutine: 'static,
        M: Joinable<C::Output>,
    {
        Exec {
            mailboxes: self.clone(),
            state: ExecState::Start(body.into_coroutine()),
        }
    }
}

/// Computation returned by [`Mailboxes::exec`].
pub struct Exec<M, C> {
    mailboxes: Mailboxes<M>,
    state: ExecState<C>,
}

enum ExecState<C> {
    Start(C),
    Joining(TaskId),
    Finished,
}

impl<M, C> Coroutine for Exec<M, C>
where
    M: Clone + Joinable<C::Output> + 'static,
    C: Coroutine + 'static,
{
    type Output = M;

    fn resume(&mut self, rt: &Runtime) -> Result<Step<M>, TaskError> {
        if matches!(self.state, ExecState::Start(_)) {
            let ExecState::Start(body) = std::mem::replace(&mut self.state, ExecState::Finished)
            else {
                return Err(TaskError::exhausted());
            };

            let parent = self.mailboxes.open(None)?;
            let child = rt.admit(
                Child {
                    body,
                    parent,
                    mailboxes: self.mailboxes.clone(),
                },
                Priority::DEFAULT,
            );

            tracing::debug!(task = %parent, %child, "joining child task");
            self.state = ExecState::Joining(parent);
        }

        let ExecState::Joining(parent) = self.state else {
            return Err(TaskError::exhausted());
        };

        match self.mailboxes.recv(Target::One(parent))? {
            None => Ok(Step::Yield),
            Some(message) => {
                self.mailboxes.close(Some(parent))?;
                self.state = ExecState::Finished;
                Ok(Step::Done(message))
            }
        }
    }
}

struct Child<M, C> {
    body: C,
    parent: TaskId,
    mailboxes: Mailboxes<M>,
}

impl<M, C> Coroutine for Child<M, C>
where
    M: Clone + Joinable<C::Output> + 'static,
    C: Coroutine,
{
    type Output = ();

    fn resume(&mut self, rt: &Runtime) -> Result<Step<()>, TaskError> {
        // A panicking child still has to deliver, or the join never finishes.
        let step = panic::catch_unwind(AssertUnwindSafe(|| self.body.resume(rt)))
            .unwrap_or_else(|payload| Err(TaskError::from_panic(payload)));

        let result = match step {
            Ok(Step::Yield) => return Ok(Step::Yield),
            Ok(Step::Done(value)) => Ok(value),
            Err(err) => {
                tracing::debug!(parent = %self.parent, error = %err, "child failed, forwarding");
                Err(err)
            }
        };

        self.mailboxes
            .send(M::from_join(result), Target::One(self.parent))?;

        Ok(Step::Done(()))
    }
}
