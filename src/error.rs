//! Error types surfaced by the runtime.
//!
//! Two families exist:
//!
//! - [`TaskError`] is a failure raised *inside* a task body. The engine catches it at the
//!   scheduling boundary, removes the task and forwards the error to the
//!   [`ErrorReport`](crate::ErrorReport) collaborator.
//! - [`Error`] is a failure returned to the *caller* of a runtime operation, such as asking
//!   for the current task id outside of a resumption.

use crate::runtime::LayerId;
use crate::task::TaskId;

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures returned by runtime, mailbox and layer operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// An operation that needs a resumed task was called outside of one.
    #[error("illegal call context: no task is currently being resumed")]
    NoCurrentTask,

    /// `recv` targeted a single mailbox that was never opened (or already closed).
    #[error("task {0} is not open for messages")]
    MailboxNotOpen(TaskId),

    /// `tick_once` was called from inside a running tick.
    #[error("tick_once called while a tick is already running")]
    ReentrantTick,

    /// A layer tried to install a second interceptor for the same operation.
    #[error("layer `{layer}` already intercepts `{operation}`")]
    DuplicateInterceptor {
        layer: LayerId,
        operation: &'static str,
    },

    /// A layer with this identity is already installed on the runtime.
    #[error("layer `{0}` is already installed")]
    LayerInstalled(LayerId),

    /// The driven task failed.
    #[error("task failed: {0}")]
    TaskFailed(#[from] TaskError),

    /// The driven task disappeared, or the tick budget ran out, before it produced a value.
    #[error("task {0} stopped before producing a value")]
    Stalled(TaskId),
}

/// A failure raised while resuming a task body.
///
/// Carries the three pieces the host reporter expects: an error name, a message and a trace.
/// `TaskError` is `Clone` so it can be forwarded as a value through mailboxes and deferreds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}: {message}")]
pub struct TaskError {
    name: Cow<'static, str>,
    message: String,
    trace: String,
}

impl TaskError {
    /// Creates a generic `"Error"` with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    /// Creates an error with an explicit name (e.g. `"TypeError"`).
    pub fn named(name: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        let backtrace = Backtrace::capture();
        let trace = match backtrace.status() {
            BacktraceStatus::Captured => backtrace.to_string(),
            _ => String::new(),
        };

        Self {
            name: name.into(),
            message: message.into(),
            trace,
        }
    }

    /// Converts a panic payload caught at the scheduling boundary.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "task panicked".to_string()
        };

        Self::named("Panic", message)
    }

    pub(crate) fn exhausted() -> Self {
        Self::named("StateError", "computation resumed after completion")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Captured backtrace, empty unless `RUST_BACKTRACE` enabled capture.
    pub fn trace(&self) -> &str {
        &self.trace
    }
}

/// Lets task bodies use `?` on runtime operations; the failure is named after its kind.
impl From<Error> for TaskError {
    fn from(err: Error) -> Self {
        let name = match &err {
            Error::TaskFailed(inner) => return inner.clone(),
            Error::NoCurrentTask | Error::ReentrantTick => "IllegalCallContext",
            Error::MailboxNotOpen(_) => "MailboxNotOpen",
            Error::DuplicateInterceptor { .. } | Error::LayerInstalled(_) => "LayerError",
            Error::Stalled(_) => "Stalled",
        };

        TaskError::named(name, err.to_string())
    }
}
