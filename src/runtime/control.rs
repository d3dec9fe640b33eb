//! Reentrancy control flags.
//!
//! A running task can ask the engine to resume it again before advancing (`same_task`) or to
//! keep scheduling inside the current tick (`continue_tick`). Requests come in two lifetimes:
//!
//! - *permanent* requests persist until cleared
//! - *transient* requests apply to the decision at the end of the current step only
//!
//! When a transient request exists it replaces the permanent pair for that one decision.

/// One pair of control requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Control {
    pub same_task: bool,
    pub continue_tick: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ControlState {
    permanent: Control,
    transient: Option<Control>,
    // Decision of the previous step, consumed when the next step selects its task.
    carried: Option<Control>,
}

impl ControlState {
    pub(crate) fn request_same_task(&mut self, permanent: bool) {
        self.update(permanent, |control| control.same_task = true);
    }

    pub(crate) fn request_continue_tick(&mut self, permanent: bool) {
        self.update(permanent, |control| control.continue_tick = true);
    }

    pub(crate) fn clear(&mut self, permanent: bool) {
        if permanent {
            self.permanent = Control::default();
        } else {
            self.transient = None;
        }
    }

    /// Control in effect when selecting the next task.
    pub(crate) fn take_carried(&mut self) -> Control {
        self.carried.take().unwrap_or(self.permanent)
    }

    /// Resolves the control for the step that just ran and consumes the transient request.
    pub(crate) fn resolve(&mut self) -> Control {
        let resolved = self.transient.take().unwrap_or(self.permanent);
        self.carried = Some(resolved);
        resolved
    }

    pub(crate) fn permanent(&self) -> Control {
        self.permanent
    }

    fn update(&mut self, permanent: bool, apply: impl FnOnce(&mut Control)) {
        if permanent {
            apply(&mut self.permanent);
        } else {
            apply(self.transient.get_or_insert_with(Control::default));
        }
    }
}
