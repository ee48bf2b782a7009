//! Priority queue of pending tasks.

mod entry;

pub use entry::{Priority, ReadyTask};

use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;

use crate::observability::QueueCounts;
use crate::tasks::Task;
use entry::QueueEntry;

struct QueueState {
    heap: BinaryHeap<QueueEntry>,
    next_seq: u64,
}

/// Holds every task that has a pending run time.
///
/// Design:
/// - The heap is keyed by (next run time, priority, insertion order).
/// - Every `push` signals `notify`, so a scheduler sleeping on an older,
///   later deadline wakes up and re-reads `peek_deadline`.
/// - `Notify::notify_one` stores a permit when nobody waits, so a push that
///   lands between `peek_deadline` and the wait is never missed.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            notify: Notify::new(),
        }
    }

    pub fn push(&self, task: Box<dyn Task>, priority: Priority, next_run_at: DateTime<Utc>) {
        {
            let mut state = self.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(QueueEntry {
                next_run_at,
                priority,
                seq,
                task,
            });
        }
        // Notify outside the lock.
        self.notify.notify_one();
    }

    /// Earliest pending run time, if any.
    pub fn peek_deadline(&self) -> Option<DateTime<Utc>> {
        self.state.lock().heap.peek().map(|entry| entry.next_run_at)
    }

    /// Removes every task due at `now`.
    ///
    /// The result is ordered by priority (highest first), then by run time,
    /// then by insertion order.
    pub fn pop_ready(&self, now: DateTime<Utc>) -> Vec<ReadyTask> {
        let mut ready = Self::take_due(&mut self.state.lock(), now);
        ready.sort_by_key(QueueEntry::ready_key);
        ready.into_iter().map(ReadyTask::from).collect()
    }

    /// Removes the first task `pop_ready` would return, leaving the rest
    /// queued.
    ///
    /// The scheduler pops one task per free execution slot, so a task that
    /// becomes due (or is pushed) while every slot is busy still competes
    /// on priority with the ones that were due before it.
    pub fn pop_next_ready(&self, now: DateTime<Utc>) -> Option<ReadyTask> {
        let mut state = self.state.lock();
        let mut due = Self::take_due(&mut state, now);
        let best = due
            .iter()
            .enumerate()
            .min_by_key(|(_, entry)| entry.ready_key())
            .map(|(index, _)| index)?;
        let entry = due.swap_remove(best);
        state.heap.extend(due);
        Some(entry.into())
    }

    fn take_due(state: &mut QueueState, now: DateTime<Utc>) -> Vec<QueueEntry> {
        let mut due = Vec::new();
        while state.heap.peek().is_some_and(|entry| entry.next_run_at <= now) {
            // Heap is sorted, so we can stop at the first future entry.
            if let Some(entry) = state.heap.pop() {
                due.push(entry);
            }
        }
        due
    }

    /// Drops every pending task and hands them back, earliest first.
    pub fn reset(&self) -> Vec<ReadyTask> {
        let drained = std::mem::take(&mut self.state.lock().heap);
        drained
            .into_sorted_vec()
            .into_iter()
            .rev()
            .map(ReadyTask::from)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> QueueCounts {
        let state = self.state.lock();
        let mut counts = QueueCounts {
            next_deadline: state.heap.peek().map(|e| e.next_run_at),
            ..QueueCounts::default()
        };
        for entry in state.heap.iter() {
            counts.total += 1;
            match entry.priority {
                Priority::High => counts.high += 1,
                Priority::Default => counts.default += 1,
            }
        }
        counts
    }

    /// Completes after the next `push` (or immediately if one happened
    /// since the last wake-up).
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
