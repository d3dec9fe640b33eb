//! Inter-task messaging: per-task mailboxes and the thread/join primitive built on them.
//!
//! Receiving never blocks. A task that wants to wait for a message polls
//! [`Mailboxes::recv`] from its own body and yields while it gets `None`;
//! [`Mailboxes::exec`] packages exactly that loop around a child task.

pub mod mailbox;
pub mod thread;

pub use mailbox::{Count, MAILBOX_LAYER, Mailboxes, Target};
pub use thread::{Exec, Joinable};
