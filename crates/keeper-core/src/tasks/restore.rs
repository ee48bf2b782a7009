//! One-off restore of a path from a snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::operation::{OperationBinding, catch_panic};
use super::progress::ProgressReporter;
use super::{Task, TaskContext, run_failure_hooks};
use crate::domain::{Operation, OperationKind, OperationStatus, RestoreProgressEntry};
use crate::error::KeeperError;

/// What to restore and where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreTaskOpts {
    pub plan_id: String,
    pub repo_id: String,
    pub snapshot_id: String,
    /// Path inside the snapshot.
    pub path: String,
    /// Directory on the host the files are written to.
    pub target: String,
}

impl RestoreTaskOpts {
    fn validate(&self) -> Result<(), KeeperError> {
        if self.snapshot_id.is_empty() {
            return Err(KeeperError::Config("restore requires a snapshot id".into()));
        }
        if self.path.is_empty() {
            return Err(KeeperError::Config("restore requires a path".into()));
        }
        if self.target.is_empty() {
            return Err(KeeperError::Config("restore requires a target".into()));
        }
        Ok(())
    }
}

/// Restores once, at a fixed time.
///
/// The operation is created `PENDING` as soon as the task is queued so the
/// request is visible in the log before it runs.
#[derive(Debug)]
pub struct OneoffRestoreTask {
    opts: RestoreTaskOpts,
    at: Option<DateTime<Utc>>,
    pending: Option<Operation>,
}

impl OneoffRestoreTask {
    pub fn new(opts: RestoreTaskOpts, at: DateTime<Utc>) -> Result<Self, KeeperError> {
        opts.validate()?;
        Ok(Self {
            opts,
            at: Some(at),
            pending: None,
        })
    }

    pub fn opts(&self) -> &RestoreTaskOpts {
        &self.opts
    }

    fn new_operation(&self, start_ms: i64) -> Operation {
        Operation::restore(
            &self.opts.plan_id,
            &self.opts.repo_id,
            &self.opts.snapshot_id,
            &self.opts.path,
            &self.opts.target,
            start_ms,
        )
    }

    async fn restore(&mut self, cx: &TaskContext) -> Result<(), KeeperError> {
        let mut op = match self.pending.take() {
            Some(op) => op,
            None => self.new_operation(cx.now_millis()),
        };
        op.unix_time_start_ms = cx.now_millis();

        let mut binding =
            OperationBinding::begin(cx.oplog().clone(), cx.clock().clone(), op).await?;
        let result = catch_panic(self.restore_with_progress(cx, &mut binding)).await;
        binding.finish(result).await
    }

    async fn restore_with_progress(
        &self,
        cx: &TaskContext,
        binding: &mut OperationBinding,
    ) -> Result<(), KeeperError> {
        let repo = cx.get_repo(&self.opts.repo_id).await?;

        let reporter = ProgressReporter::spawn(
            cx.oplog().clone(),
            binding.operation().clone(),
            cx.settings().restore_progress_interval,
            apply_restore_progress,
        );
        let report = |entry: RestoreProgressEntry| reporter.report(entry);
        let result = catch_panic(async {
            repo.restore(
                &cx.cancel,
                &self.opts.snapshot_id,
                &self.opts.path,
                &self.opts.target,
                &report,
            )
            .await
            .map_err(|e| {
                let context = format!("restore of snapshot {:?}", self.opts.snapshot_id);
                KeeperError::execution(context, e)
            })
        })
        .await;
        if let Some(last) = reporter.close().await {
            apply_restore_progress(binding.operation_mut(), last);
        }

        let summary = result?;
        apply_restore_progress(binding.operation_mut(), summary);
        Ok(())
    }
}

fn apply_restore_progress(op: &mut Operation, entry: RestoreProgressEntry) {
    if let OperationKind::Restore { status, .. } = &mut op.kind {
        *status = Some(entry);
    }
}

#[async_trait]
impl Task for OneoffRestoreTask {
    fn name(&self) -> String {
        format!(
            "restore snapshot {:?} in repo {:?}",
            self.opts.snapshot_id, self.opts.repo_id
        )
    }

    fn next(&mut self, _now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.at.take()
    }

    async fn prepare(&mut self, at: DateTime<Utc>, cx: &TaskContext) -> Result<(), KeeperError> {
        if self.pending.is_some() {
            return Ok(());
        }
        let mut op = self.new_operation(at.timestamp_millis());
        op.transition(OperationStatus::Pending)?;
        cx.oplog().add(&mut op).await?;
        tracing::debug!(operation = ?op.id, snapshot = %self.opts.snapshot_id, "restore queued");
        self.pending = Some(op);
        Ok(())
    }

    /// Closes the pre-created `PENDING` operation as `ERROR`.
    async fn discard(&mut self, reason: &str, cx: &TaskContext) -> Result<(), KeeperError> {
        let Some(mut op) = self.pending.take() else {
            return Ok(());
        };
        op.transition(OperationStatus::Error)?;
        op.display_message = Some(format!("restore not started: {reason}"));
        op.unix_time_end_ms = Some(cx.now_millis());
        cx.oplog().update(&op).await?;
        tracing::info!(
            operation = ?op.id,
            snapshot = %self.opts.snapshot_id,
            reason,
            "queued restore dropped"
        );
        Ok(())
    }

    async fn run(&mut self, cx: &TaskContext) -> Result<(), KeeperError> {
        let result = self.restore(cx).await;
        if let Err(err) = &result {
            run_failure_hooks(
                cx,
                &self.opts.repo_id,
                None,
                &self.name(),
                err,
                Some(&self.opts.snapshot_id),
            )
            .await;
        }
        result
    }
}
