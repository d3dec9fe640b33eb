//! Name-indexed interception of runtime operations.
//!
//! Every public operation of the [`Runtime`](crate::Runtime), plus the task-store operations
//! it performs, is described by an [`Operation`] marker in [`ops`]. Before running an
//! operation the runtime asks the registry for an interceptor registered under the
//! operation's name. If one exists it is called with the undecorated operation and the
//! arguments, and its return value replaces the original result; otherwise the original runs
//! unmodified.
//!
//! Interceptors are grouped by [`LayerId`]. Layers are consulted in registration order and the
//! first layer with an entry for the name wins, so this is a single-dispatch hook point, not a
//! pipeline. Removing a layer removes exactly the entries it installed.
//!
//! ```ignore
//! use tickwork::{Runtime, runtime::ops};
//!
//! let rt = Runtime::new();
//! rt.register_override::<ops::Cancel, _>("audit", |original, id| {
//!     tracing::info!("cancelling {id}");
//!     original(id)
//! })?;
//! ```

use crate::error::{Error, Result};

use indexmap::IndexMap;

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Describes one interceptable operation: its registry name and its call signature.
pub trait Operation: 'static {
    /// `"<subject>.<operation>"`, e.g. `"scheduler.cancel"`.
    const NAME: &'static str;
    type Args: 'static;
    type Output: 'static;
}

/// Marker types for every interceptable operation.
pub mod ops {
    use super::Operation;
    use crate::error::Error;
    use crate::priority::Priority;
    use crate::task::{BoxedTask, TaskId};

    macro_rules! operation {
        ($(#[$meta:meta])* $ty:ident, $name:literal, $args:ty => $output:ty) => {
            $(#[$meta])*
            pub struct $ty;

            impl Operation for $ty {
                const NAME: &'static str = $name;
                type Args = $args;
                type Output = $output;
            }
        };
    }

    operation!(
        /// `Runtime::admit`.
        Admit, "scheduler.admit", (BoxedTask, Priority) => TaskId
    );
    operation!(
        /// `Runtime::cancel`.
        Cancel, "scheduler.cancel", TaskId => bool
    );
    operation!(
        /// `Runtime::request_same_task`; the argument is `permanent`.
        RequestSameTask, "scheduler.request_same_task", bool => ()
    );
    operation!(
        /// `Runtime::request_continue_tick`; the argument is `permanent`.
        RequestContinueTick, "scheduler.request_continue_tick", bool => ()
    );
    operation!(
        /// `Runtime::clear_control`; the argument is `permanent`.
        ClearControl, "scheduler.clear_control", bool => ()
    );
    operation!(
        /// `Runtime::current_task_id`.
        CurrentTaskId, "scheduler.current_task_id", () => Result<TaskId, Error>
    );
    operation!(
        /// `Runtime::tick_once`.
        TickOnce, "scheduler.tick_once", () => Result<(), Error>
    );
    operation!(
        /// `Runtime::stats`.
        Stats, "scheduler.stats", () => crate::runtime::Stats
    );
    operation!(
        /// `Runtime::iteration_counts`.
        IterationCounts, "scheduler.iteration_counts", () => crate::runtime::IterationCounts
    );
    operation!(
        /// Insertion into the task store, reached from `Runtime::admit`.
        StoreAdmit, "store.admit", (BoxedTask, Priority) => TaskId
    );
    operation!(
        /// Removal from the task store: cancellation, completion and failure all end here.
        StoreRemove, "store.remove", TaskId => bool
    );
}

/// Opaque identity of an interception layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerId(Cow<'static, str>);

impl LayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for LayerId {
    fn from(name: &'static str) -> Self {
        LayerId(Cow::Borrowed(name))
    }
}

impl From<String> for LayerId {
    fn from(name: String) -> Self {
        LayerId(Cow::Owned(name))
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered interceptor for operation `O`.
pub struct Interceptor<O: Operation> {
    #[allow(clippy::type_complexity)]
    hook: Box<dyn Fn(&mut dyn FnMut(O::Args) -> O::Output, O::Args) -> O::Output>,
}

impl<O: Operation> Interceptor<O> {
    /// Runs the interceptor in place of `original`.
    pub fn call(
        &self,
        original: &mut dyn FnMut(O::Args) -> O::Output,
        args: O::Args,
    ) -> O::Output {
        (self.hook)(original, args)
    }
}

/// Table of interceptors keyed by layer, then by operation name.
#[derive(Default)]
pub struct OverrideRegistry {
    layers: IndexMap<LayerId, HashMap<&'static str, Rc<dyn Any>>>,
}

impl OverrideRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `hook` for operation `O` under `layer`.
    ///
    /// Fails if `layer` already intercepts `O`.
    pub fn register<O, F>(&mut self, layer: impl Into<LayerId>, hook: F) -> Result<()>
    where
        O: Operation,
        F: Fn(&mut dyn FnMut(O::Args) -> O::Output, O::Args) -> O::Output + 'static,
    {
        let layer = layer.into();
        let entries = self.layers.entry(layer.clone()).or_default();

        if entries.contains_key(O::NAME) {
            return Err(Error::DuplicateInterceptor {
                layer,
                operation: O::NAME,
            });
        }

        let interceptor: Rc<dyn Any> = Rc::new(Interceptor::<O> {
            hook: Box::new(hook),
        });
        entries.insert(O::NAME, interceptor);

        tracing::debug!(layer = %layer, operation = O::NAME, "interceptor registered");

        Ok(())
    }

    /// Removes every interceptor `layer` installed. Returns how many were removed.
    pub fn unregister(&mut self, layer: &LayerId) -> usize {
        let removed = self
            .layers
            .shift_remove(layer)
            .map(|entries| entries.len())
            .unwrap_or(0);

        if removed > 0 {
            tracing::debug!(layer = %layer, removed, "layer unregistered");
        }

        removed
    }

    /// The interceptor that wins for `O`, if any.
    pub fn lookup<O: Operation>(&self) -> Option<Rc<Interceptor<O>>> {
        self.layers
            .values()
            .find_map(|entries| entries.get(O::NAME))
            .and_then(|entry| Rc::clone(entry).downcast::<Interceptor<O>>().ok())
    }

    /// The layer whose interceptor wins for `name`, if any.
    pub fn intercepting_layer(&self, name: &str) -> Option<&LayerId> {
        self.layers
            .iter()
            .find(|(_, entries)| entries.contains_key(name))
            .map(|(layer, _)| layer)
    }

    pub fn is_installed(&self, layer: &LayerId) -> bool {
        self.layers
            .get(layer)
            .is_some_and(|entries| !entries.is_empty())
    }
}
