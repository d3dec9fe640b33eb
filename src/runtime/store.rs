//! Priority-bucketed task storage.
//!
//! Tasks live in a [`Slab`] arena; each distinct priority owns a bucket listing the arena keys
//! of its tasks in admission order together with a round-robin cursor. A descending index of
//! the priorities in use picks the bucket to service.
//!
//! Admission and removal are O(1) apart from inserting a brand new priority into the index.
//! Removal swaps the last task of the bucket into the freed slot, except at the front of a
//! bucket where the task is simply popped so the remaining order is untouched.
//!
//! The store knows nothing about scheduling policy; [`Runtime`](crate::Runtime) decides what
//! to select and when to advance a cursor.

use crate::priority::Priority;
use crate::task::TaskId;
use crate::utils::Slab;

use std::collections::{HashMap, VecDeque};

struct Entry<T> {
    id: TaskId,
    priority: Priority,
    // Absolute position; the position inside the bucket is `index - bucket.base`.
    index: u64,
    payload: T,
}

#[derive(Default)]
struct Bucket {
    keys: VecDeque<usize>,
    base: u64,
    cursor: usize,
}

impl Bucket {
    fn position(&self, index: u64) -> usize {
        (index - self.base) as usize
    }
}

/// Pending tasks grouped by priority.
///
/// Generic over the per-task payload so the bookkeeping can be exercised on its own; the
/// runtime stores task bodies in it.
pub struct TaskStore<T> {
    entries: Slab<Entry<T>>,
    ids: HashMap<TaskId, usize>,
    buckets: HashMap<Priority, Bucket>,
    priorities: Vec<Priority>,
    next_id: u64,
}

impl<T> Default for TaskStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskStore<T> {
    pub fn new() -> Self {
        Self {
            entries: Slab::new(),
            ids: HashMap::new(),
            buckets: HashMap::new(),
            priorities: Vec::new(),
            next_id: 1,
        }
    }

    /// Stores `payload` under a fresh id at the end of its priority bucket.
    pub fn admit(&mut self, payload: T, priority: Priority) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;

        if !self.buckets.contains_key(&priority) {
            // Kept sorted descending.
            if let Err(at) = self.priorities.binary_search_by(|probe| priority.cmp(probe)) {
                self.priorities.insert(at, priority);
            }
        }
        let bucket = self.buckets.entry(priority).or_default();

        let index = bucket.base + bucket.keys.len() as u64;
        let key = self.entries.insert(Entry {
            id,
            priority,
            index,
            payload,
        });
        bucket.keys.push_back(key);
        self.ids.insert(id, key);

        id
    }

    /// Removes a task, returning its payload, or `None` if the id is not pending.
    pub fn remove(&mut self, id: TaskId) -> Option<T> {
        let key = self.ids.remove(&id)?;
        let entry = self.entries.remove(key)?;

        let Some(bucket) = self.buckets.get_mut(&entry.priority) else {
            debug_assert!(false, "task {id} has no bucket at priority {}", entry.priority);
            return Some(entry.payload);
        };

        let position = bucket.position(entry.index);
        let last = bucket.keys.len() - 1;

        if position == 0 {
            bucket.keys.pop_front();
            bucket.base += 1;
            bucket.cursor = bucket.cursor.saturating_sub(1);
        } else {
            bucket.keys.swap_remove_back(position);

            if position != last {
                let moved = bucket.keys[position];
                if let Some(moved) = self.entries.get_mut(moved) {
                    moved.index = bucket.base + position as u64;
                }
                if bucket.cursor == last {
                    bucket.cursor = position;
                }
            }
        }

        if bucket.cursor >= bucket.keys.len() {
            bucket.cursor = 0;
        }

        if bucket.keys.is_empty() {
            self.buckets.remove(&entry.priority);
            self.priorities.retain(|p| *p != entry.priority);
        }

        debug_assert_eq!(self.priorities.len(), self.buckets.len());

        Some(entry.payload)
    }

    /// Picks the task to resume next.
    ///
    /// `preferred` wins if it is still pending; otherwise the task under the cursor of the
    /// highest-priority bucket is chosen.
    pub fn select(&self, preferred: Option<TaskId>) -> Option<TaskId> {
        if let Some(id) = preferred {
            if self.ids.contains_key(&id) {
                return Some(id);
            }
        }

        let bucket = self.buckets.get(self.priorities.first()?)?;
        let key = *bucket.keys.get(bucket.cursor)?;

        self.entries.get(key).map(|entry| entry.id)
    }

    /// Moves the cursor of `id`'s bucket to the slot after `id`, wrapping around.
    pub fn advance_past(&mut self, id: TaskId) {
        let Some(entry) = self.ids.get(&id).and_then(|key| self.entries.get(*key)) else {
            return;
        };

        if let Some(bucket) = self.buckets.get_mut(&entry.priority) {
            let next = bucket.position(entry.index) + 1;
            bucket.cursor = if next < bucket.keys.len() { next } else { 0 };
        }
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut T> {
        let key = *self.ids.get(&id)?;
        self.entries.get_mut(key).map(|entry| &mut entry.payload)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.ids.contains_key(&id)
    }

    pub fn priority_of(&self, id: TaskId) -> Option<Priority> {
        let key = *self.ids.get(&id)?;
        self.entries.get(key).map(|entry| entry.priority)
    }

    /// Position of `id` inside its bucket.
    pub fn position_of(&self, id: TaskId) -> Option<usize> {
        let entry = self.entries.get(*self.ids.get(&id)?)?;
        let bucket = self.buckets.get(&entry.priority)?;

        Some(bucket.position(entry.index))
    }

    /// Priorities in use, highest first.
    pub fn priorities(&self) -> &[Priority] {
        &self.priorities
    }

    /// Task ids of one bucket in bucket order.
    pub fn bucket(&self, priority: Priority) -> Vec<TaskId> {
        self.buckets
            .get(&priority)
            .map(|bucket| {
                bucket
                    .keys
                    .iter()
                    .filter_map(|key| self.entries.get(*key).map(|entry| entry.id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every pending id, in no particular order.
    pub fn ids(&self) -> Vec<TaskId> {
        self.ids.keys().copied().collect()
    }

    pub fn next_id(&self) -> TaskId {
        TaskId(self.next_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }

    /// Verifies the store's structural invariants.
    ///
    /// - the priority index is sorted descending and names exactly the non-empty buckets
    /// - every task sits in the bucket of its priority, at the position its index records
    /// - every cursor points inside its bucket
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.priorities.windows(2).any(|pair| pair[0] <= pair[1]) {
            return Err(InvariantViolation::UnsortedIndex);
        }

        if self.priorities.len() != self.buckets.len() {
            return Err(InvariantViolation::IndexOutOfSync);
        }

        for priority in &self.priorities {
            let Some(bucket) = self.buckets.get(priority) else {
                return Err(InvariantViolation::IndexOutOfSync);
            };

            if bucket.keys.is_empty() {
                return Err(InvariantViolation::EmptyBucket(*priority));
            }

            if bucket.cursor >= bucket.keys.len() {
                return Err(InvariantViolation::CursorOutOfRange(*priority));
            }

            for (position, key) in bucket.keys.iter().enumerate() {
                let Some(entry) = self.entries.get(*key) else {
                    return Err(InvariantViolation::DanglingKey(*key));
                };

                if entry.priority != *priority || bucket.position(entry.index) != position {
                    return Err(InvariantViolation::Misplaced(entry.id));
                }
            }
        }

        for (key, entry) in self.entries.iter() {
            if self.ids.get(&entry.id) != Some(&key) {
                return Err(InvariantViolation::Misplaced(entry.id));
            }
        }

        if self.ids.len() != self.entries.len() {
            return Err(InvariantViolation::IdMapOutOfSync);
        }

        Ok(())
    }
}

/// A broken [`TaskStore`] invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("priority index is not sorted descending")]
    UnsortedIndex,
    #[error("priority index and buckets disagree")]
    IndexOutOfSync,
    #[error("bucket for priority {0} is empty")]
    EmptyBucket(Priority),
    #[error("cursor of bucket {0} is out of range")]
    CursorOutOfRange(Priority),
    #[error("bucket refers to missing arena slot {0}")]
    DanglingKey(usize),
    #[error("task {0} is not where its index says")]
    Misplaced(TaskId),
    #[error("id map and arena disagree")]
    IdMapOutOfSync,
}
