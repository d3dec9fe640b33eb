//! Per-task FIFO mailboxes.
//!
//! A mailbox is keyed by the id of the task that owns it. Installing [`Mailboxes`] on a
//! runtime registers a `store.remove` interceptor under the layer [`MAILBOX_LAYER`], so a
//! task's mailbox disappears the moment the task is cancelled, completes or fails.
//!
//! ```ignore
//! use tickwork::channel::{Mailboxes, Target};
//!
//! let boxes: Mailboxes<&str> = Mailboxes::install(&rt)?;
//! boxes.open(Some(id))?;
//! boxes.send("hi", Target::One(id))?;
//! assert_eq!(boxes.recv(Target::One(id))?, Some("hi"));
//! ```

use crate::error::{Error, Result};
use crate::runtime::{LayerId, Runtime, ops};
use crate::task::TaskId;

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

/// Layer identity of the mailbox interceptor.
pub const MAILBOX_LAYER: &str = "mailbox";

type Inboxes<M> = BTreeMap<TaskId, VecDeque<M>>;

/// Who a send or receive addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The task being resumed.
    Current,
    /// Every open mailbox, in ascending task id order.
    All,
    /// The listed mailboxes, in list order. Unopened ids are skipped.
    Many(Vec<TaskId>),
    One(TaskId),
}

impl From<TaskId> for Target {
    fn from(id: TaskId) -> Self {
        Target::One(id)
    }
}

impl From<Vec<TaskId>> for Target {
    fn from(ids: Vec<TaskId>) -> Self {
        Target::Many(ids)
    }
}

/// How many messages a receive may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Count {
    Limit(usize),
    Unbounded,
}

impl Count {
    fn allows(self, taken: usize) -> bool {
        match self {
            Count::Limit(limit) => taken < limit,
            Count::Unbounded => true,
        }
    }
}

/// The mailbox table of one runtime, carrying messages of type `M`.
pub struct Mailboxes<M> {
    rt: Runtime,
    inboxes: Rc<RefCell<Inboxes<M>>>,
}

impl<M> Clone for Mailboxes<M> {
    fn clone(&self) -> Self {
        Self {
            rt: self.rt.clone(),
            inboxes: Rc::clone(&self.inboxes),
        }
    }
}

impl<M: 'static> Mailboxes<M> {
    /// Installs the mailbox layer on `rt`.
    ///
    /// Fails with [`Error::LayerInstalled`] if a mailbox layer is already installed.
    pub fn install(rt: &Runtime) -> Result<Self> {
        let layer = LayerId::from(MAILBOX_LAYER);
        if rt.is_layer_installed(&layer) {
            return Err(Error::LayerInstalled(layer));
        }

        let inboxes: Rc<RefCell<Inboxes<M>>> = Rc::new(RefCell::new(BTreeMap::new()));
        let weak = Rc::downgrade(&inboxes);

        rt.register_override::<ops::StoreRemove, _>(layer, move |original, id| {
            // Dropped outside the borrow; messages may own runtime handles.
            let discarded = match weak.upgrade() {
                Some(inboxes) => {
                    let removed = inboxes.borrow_mut().remove(&id);
                    removed
                }
                None => None,
            };
            if let Some(discarded) = discarded {
                tracing::trace!(task = %id, dropped = discarded.len(), "mailbox closed with task");
            }
            original(id)
        })?;

        tracing::debug!("mailbox layer installed");

        Ok(Self {
            rt: rt.clone(),
            inboxes,
        })
    }

    /// Removes the mailbox layer. Open mailboxes are kept but no longer close with their task.
    pub fn uninstall(&self) -> usize {
        self.rt.unregister_layer(MAILBOX_LAYER)
    }

    /// Opens the mailbox of `id`, or of the current task. Idempotent.
    pub fn open(&self, id: Option<TaskId>) -> Result<TaskId> {
        let id = self.resolve(id)?;
        self.inboxes.borrow_mut().entry(id).or_default();
        Ok(id)
    }

    /// Closes the mailbox of `id`, or of the current task, discarding its messages.
    pub fn close(&self, id: Option<TaskId>) -> Result<bool> {
        let id = self.resolve(id)?;
        let discarded = self.inboxes.borrow_mut().remove(&id);
        Ok(discarded.is_some())
    }

    pub fn is_open(&self, id: TaskId) -> bool {
        self.inboxes.borrow().contains_key(&id)
    }

    /// Messages waiting in the mailbox of `id`; zero if it is not open.
    pub fn len(&self, id: TaskId) -> usize {
        self.inboxes.borrow().get(&id).map_or(0, VecDeque::len)
    }

    /// Delivers `message` and returns how many mailboxes received it.
    ///
    /// A `One` target without a mailbox gets one opened if it is a pending task; otherwise
    /// the message is dropped. `Current` only delivers to the caller's mailbox once it was
    /// opened. `All` and `Many` deliver to open mailboxes only.
    pub fn send(&self, message: M, target: impl Into<Target>) -> Result<usize>
    where
        M: Clone,
    {
        let delivered = match target.into() {
            Target::Current => {
                let id = self.rt.current_task_id()?;
                match self.inboxes.borrow_mut().get_mut(&id) {
                    Some(inbox) => {
                        inbox.push_back(message);
                        1
                    }
                    None => 0,
                }
            }
            Target::One(id) => self.deliver(id, message),
            Target::All => {
                let mut inboxes = self.inboxes.borrow_mut();
                for inbox in inboxes.values_mut() {
                    inbox.push_back(message.clone());
                }
                inboxes.len()
            }
            Target::Many(ids) => {
                let mut inboxes = self.inboxes.borrow_mut();
                let mut delivered = 0;
                for id in ids {
                    if let Some(inbox) = inboxes.get_mut(&id) {
                        inbox.push_back(message.clone());
                        delivered += 1;
                    }
                }
                delivered
            }
        };

        Ok(delivered)
    }

    /// Takes one message without blocking. `Ok(None)` means nothing is waiting.
    ///
    /// A single target that is not open fails with [`Error::MailboxNotOpen`]; `All` and
    /// `Many` take from the first listed mailbox holding a message.
    pub fn recv(&self, target: impl Into<Target>) -> Result<Option<M>> {
        Ok(self.recv_up_to(target, Count::Limit(1))?.pop())
    }

    /// Takes up to `count` messages, draining targets one after another in target order.
    pub fn recv_up_to(&self, target: impl Into<Target>, count: Count) -> Result<Vec<M>> {
        let ids = match target.into() {
            Target::Current => vec![self.require_open(self.rt.current_task_id()?)?],
            Target::One(id) => vec![self.require_open(id)?],
            Target::All => self.inboxes.borrow().keys().copied().collect(),
            Target::Many(ids) => ids,
        };

        let mut inboxes = self.inboxes.borrow_mut();
        let mut taken = Vec::new();

        for id in ids {
            let Some(inbox) = inboxes.get_mut(&id) else {
                continue;
            };

            while count.allows(taken.len()) {
                match inbox.pop_front() {
                    Some(message) => taken.push(message),
                    None => break,
                }
            }

            if !count.allows(taken.len()) {
                break;
            }
        }

        Ok(taken)
    }

    fn deliver(&self, id: TaskId, message: M) -> usize {
        let mut inboxes = self.inboxes.borrow_mut();

        if !inboxes.contains_key(&id) {
            if !self.rt.contains(id) {
                tracing::trace!(task = %id, "message dropped: no mailbox");
                return 0;
            }
            inboxes.insert(id, VecDeque::new());
        }

        inboxes.entry(id).or_default().push_back(message);
        1
    }

    fn require_open(&self, id: TaskId) -> Result<TaskId> {
        if self.is_open(id) {
            Ok(id)
        } else {
            Err(Error::MailboxNotOpen(id))
        }
    }

    fn resolve(&self, id: Option<TaskId>) -> Result<TaskId> {
        match id {
            Some(id) => Ok(id),
            None => self.rt.current_task_id(),
        }
    }
}
