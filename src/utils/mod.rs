//! Internal data structures.

pub(crate) mod slab;

pub(crate) use slab::Slab;
