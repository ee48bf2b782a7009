//! Binds one task execution to its Operation record.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::domain::{Operation, OperationId, OperationStatus};
use crate::error::KeeperError;
use crate::ports::{Clock, OperationLog};

/// An Operation that has been moved to `INPROGRESS` and must be finished.
///
/// Lifecycle:
/// - `begin` marks the record in progress (adding it, or updating a
///   pre-created `PENDING` one)
/// - the task mutates it through `operation_mut`
/// - `finish` writes the terminal status exactly once
///
/// Work between `begin` and `finish` runs under [`catch_panic`], so a panic
/// still reaches `finish` as an error and the record never stays
/// `INPROGRESS`.
pub struct OperationBinding {
    oplog: Arc<dyn OperationLog>,
    clock: Arc<dyn Clock>,
    op: Operation,
}

impl OperationBinding {
    pub async fn begin(
        oplog: Arc<dyn OperationLog>,
        clock: Arc<dyn Clock>,
        mut op: Operation,
    ) -> Result<Self, KeeperError> {
        op.transition(OperationStatus::InProgress)?;
        match op.id {
            None => oplog.add(&mut op).await?,
            Some(_) => oplog.update(&op).await?,
        }
        tracing::debug!(
            operation = ?op.id,
            plan = %op.plan_id,
            repo = %op.repo_id,
            "operation started"
        );
        Ok(Self { oplog, clock, op })
    }

    pub fn id(&self) -> Option<OperationId> {
        self.op.id
    }

    pub fn operation(&self) -> &Operation {
        &self.op
    }

    pub fn operation_mut(&mut self) -> &mut Operation {
        &mut self.op
    }

    /// Writes the terminal status and returns the outcome of the run.
    ///
    /// A failed final write is reported as [`KeeperError::Persistence`] for a
    /// successful run, or folded into [`KeeperError::Finalize`] together with
    /// the run's own error.
    pub async fn finish(mut self, result: Result<(), KeeperError>) -> Result<(), KeeperError> {
        let (status, error) = match result {
            Ok(()) => (OperationStatus::Success, None),
            Err(err) => (OperationStatus::Error, Some(err)),
        };
        if let Err(bad) = self.op.transition(status) {
            return Err(error.unwrap_or(bad));
        }
        if let Some(err) = &error {
            self.op.display_message = Some(err.to_string());
        }
        self.op.unix_time_end_ms = Some(self.clock.now_millis());

        let duration_ms = self.op.unix_time_end_ms.unwrap_or_default() - self.op.unix_time_start_ms;
        tracing::debug!(operation = ?self.op.id, ?status, duration_ms, "operation finished");

        match (self.oplog.update(&self.op).await, error) {
            (Ok(()), None) => Ok(()),
            (Ok(()), Some(err)) => Err(err),
            (Err(update), None) => Err(KeeperError::Persistence(update)),
            (Err(update), Some(err)) => Err(KeeperError::Finalize {
                error: Box::new(err),
                update,
            }),
        }
    }
}

/// Runs `work`, turning a panic into [`KeeperError::Panicked`].
pub(crate) async fn catch_panic<T>(
    work: impl Future<Output = Result<T, KeeperError>>,
) -> Result<T, KeeperError> {
    AssertUnwindSafe(work)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(KeeperError::from_panic(payload)))
}
