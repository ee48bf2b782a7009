//! OperationLog port - durable store of operation records.

use async_trait::async_trait;

use crate::domain::{Operation, OperationId};
use crate::error::OpLogError;

/// The store every task execution writes its [`Operation`] to.
///
/// Implementations own persistence and crash recovery; the orchestrator
/// only relies on the contract below.
#[async_trait]
pub trait OperationLog: Send + Sync {
    /// Stores a new operation and assigns `op.id`.
    ///
    /// Fails with [`OpLogError::MissingField`] when plan or repo id is empty.
    async fn add(&self, op: &mut Operation) -> Result<(), OpLogError>;

    /// Replaces a stored operation. Fails with [`OpLogError::NotFound`] for
    /// unknown ids.
    async fn update(&self, op: &Operation) -> Result<(), OpLogError>;

    /// Adds every operation or none of them.
    async fn bulk_add(&self, ops: &mut [Operation]) -> Result<(), OpLogError>;

    /// The id of the record indexing `snapshot_id`, if one exists.
    async fn has_indexed_snapshot(
        &self,
        snapshot_id: &str,
    ) -> Result<Option<OperationId>, OpLogError>;
}
