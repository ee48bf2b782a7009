//! InMemoryOperationLog - operation log for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{Operation, OperationId, OperationStatus};
use crate::error::OpLogError;
use crate::ports::{IdGenerator, OperationLog, SystemClock, UlidGenerator};

#[derive(Default)]
struct LogState {
    /// Operations in insertion order.
    ops: Vec<Operation>,
    index: HashMap<OperationId, usize>,
    /// snapshot id -> id of the index record.
    snapshots: HashMap<String, OperationId>,
}

impl LogState {
    fn insert(&mut self, op: Operation) {
        let Some(id) = op.id else { return };
        if let Some(snapshot_id) = op.indexed_snapshot_id() {
            self.snapshots.insert(snapshot_id.to_string(), id);
        }
        self.index.insert(id, self.ops.len());
        self.ops.push(op);
    }
}

/// Keeps every operation in memory.
///
/// Finalized operations are frozen: an update that would move a terminal
/// record is rejected with [`OpLogError::Finalized`].
pub struct InMemoryOperationLog {
    state: Mutex<LogState>,
    ids: Box<dyn IdGenerator>,
}

impl InMemoryOperationLog {
    pub fn new() -> Self {
        Self::with_id_generator(Box::new(UlidGenerator::new(SystemClock)))
    }

    pub fn with_id_generator(ids: Box<dyn IdGenerator>) -> Self {
        Self {
            state: Mutex::new(LogState::default()),
            ids,
        }
    }

    pub fn get(&self, id: OperationId) -> Option<Operation> {
        let state = self.state.lock();
        state.index.get(&id).map(|&i| state.ops[i].clone())
    }

    /// Snapshot of all operations in insertion order.
    pub fn list(&self) -> Vec<Operation> {
        self.state.lock().ops.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate_new(op: &Operation) -> Result<(), OpLogError> {
        if let Some(id) = op.id {
            return Err(OpLogError::AlreadyExists(id));
        }
        if op.plan_id.is_empty() {
            return Err(OpLogError::MissingField("plan_id"));
        }
        if op.repo_id.is_empty() {
            return Err(OpLogError::MissingField("repo_id"));
        }
        Ok(())
    }
}

impl Default for InMemoryOperationLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OperationLog for InMemoryOperationLog {
    async fn add(&self, op: &mut Operation) -> Result<(), OpLogError> {
        Self::validate_new(op)?;
        op.id = Some(self.ids.generate_operation_id());
        self.state.lock().insert(op.clone());
        Ok(())
    }

    async fn update(&self, op: &Operation) -> Result<(), OpLogError> {
        let id = op.id.ok_or(OpLogError::MissingField("id"))?;
        let mut state = self.state.lock();
        let &i = state.index.get(&id).ok_or(OpLogError::NotFound(id))?;
        let stored = &mut state.ops[i];
        if stored.status.is_terminal() && stored.status != op.status {
            return Err(OpLogError::Finalized(id));
        }
        *stored = op.clone();
        Ok(())
    }

    async fn bulk_add(&self, ops: &mut [Operation]) -> Result<(), OpLogError> {
        for op in ops.iter() {
            Self::validate_new(op)?;
        }
        let mut state = self.state.lock();
        for op in ops.iter_mut() {
            op.id = Some(self.ids.generate_operation_id());
            state.insert(op.clone());
        }
        Ok(())
    }

    async fn has_indexed_snapshot(
        &self,
        snapshot_id: &str,
    ) -> Result<Option<OperationId>, OpLogError> {
        Ok(self.state.lock().snapshots.get(snapshot_id).copied())
    }
}

/// Counts of operations by status, handy for summaries.
pub fn count_by_status(ops: &[Operation]) -> HashMap<OperationStatus, usize> {
    let mut counts = HashMap::new();
    for op in ops {
        *counts.entry(op.status).or_insert(0) += 1;
    }
    counts
}
