//! Heap entry: a task plus the key it is ordered by.
//!
//! ## Two orderings
//! An entry is compared two ways:
//! - **heap order** `(next_run_at, priority, seq)`: what is due first. The
//!   scheduler only ever needs the earliest deadline, so the heap answers
//!   `peek` in O(1) and `push`/`pop` in O(log n).
//! - **ready order** `(priority, next_run_at, seq)`: among entries that are
//!   already due, who runs first. A restore requested by a user should not
//!   wait behind a backup that happened to become due a little earlier.
//!
//! ## Why `seq`
//! `BinaryHeap` is not stable. The insertion counter makes every key unique,
//! so two tasks due at the same instant with the same priority run in the
//! order they were queued.

use std::cmp::{Ordering, Reverse};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tasks::Task;

/// Ordering tier among tasks due at the same time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Default,
    /// User-initiated work such as restores.
    High,
}

pub(crate) struct QueueEntry {
    pub(crate) next_run_at: DateTime<Utc>,
    pub(crate) priority: Priority,
    /// Insertion sequence, breaks every remaining tie.
    pub(crate) seq: u64,
    pub(crate) task: Box<dyn Task>,
}

impl QueueEntry {
    /// Heap order: when the entry is due.
    fn key(&self) -> (DateTime<Utc>, Reverse<Priority>, u64) {
        (self.next_run_at, Reverse(self.priority), self.seq)
    }

    /// Order among entries that are already due: who runs first.
    pub(crate) fn ready_key(&self) -> (Reverse<Priority>, DateTime<Utc>, u64) {
        (Reverse(self.priority), self.next_run_at, self.seq)
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the earliest entry first.
        other.key().cmp(&self.key())
    }
}

/// A task removed from the queue because it is due.
pub struct ReadyTask {
    pub task: Box<dyn Task>,
    pub priority: Priority,
    pub scheduled_for: DateTime<Utc>,
}

impl From<QueueEntry> for ReadyTask {
    fn from(entry: QueueEntry) -> Self {
        Self {
            task: entry.task,
            priority: entry.priority,
            scheduled_for: entry.next_run_at,
        }
    }
}

impl std::fmt::Debug for ReadyTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyTask")
            .field("task", &self.task.name())
            .field("priority", &self.priority)
            .field("scheduled_for", &self.scheduled_for)
            .finish()
    }
}
