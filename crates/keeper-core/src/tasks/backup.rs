//! Backup tasks and the snapshot indexing that follows every backup.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::operation::{OperationBinding, catch_panic};
use super::progress::ProgressReporter;
use super::schedule::CronSchedule;
use super::{Task, TaskContext, run_failure_hooks};
use crate::config::PlanConfig;
use crate::domain::{BackupProgressEntry, Operation, OperationKind};
use crate::error::KeeperError;

/// Backs up a plan every time its cron schedule fires.
#[derive(Debug, Clone)]
pub struct ScheduledBackupTask {
    plan: PlanConfig,
    schedule: CronSchedule,
}

impl ScheduledBackupTask {
    pub fn new(plan: PlanConfig) -> Result<Self, KeeperError> {
        validate_plan(&plan)?;
        let expr = plan.cron.as_deref().ok_or_else(|| {
            KeeperError::Config(format!("plan {:?} has no cron schedule", plan.id))
        })?;
        let schedule = CronSchedule::parse(expr)?;
        Ok(Self { plan, schedule })
    }

    pub fn plan(&self) -> &PlanConfig {
        &self.plan
    }
}

#[async_trait]
impl Task for ScheduledBackupTask {
    fn name(&self) -> String {
        format!("backup for plan {:?}", self.plan.id)
    }

    fn next(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.next_after(now)
    }

    async fn run(&mut self, cx: &TaskContext) -> Result<(), KeeperError> {
        run_backup(cx, &self.plan, &self.name()).await
    }
}

/// Backs up a plan once, at a fixed time.
#[derive(Debug, Clone)]
pub struct OneoffBackupTask {
    plan: PlanConfig,
    at: Option<DateTime<Utc>>,
}

impl OneoffBackupTask {
    pub fn new(plan: PlanConfig, at: DateTime<Utc>) -> Result<Self, KeeperError> {
        validate_plan(&plan)?;
        Ok(Self { plan, at: Some(at) })
    }
}

#[async_trait]
impl Task for OneoffBackupTask {
    fn name(&self) -> String {
        format!("onetime backup for plan {:?}", self.plan.id)
    }

    fn next(&mut self, _now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.at.take()
    }

    async fn run(&mut self, cx: &TaskContext) -> Result<(), KeeperError> {
        run_backup(cx, &self.plan, &self.name()).await
    }
}

fn validate_plan(plan: &PlanConfig) -> Result<(), KeeperError> {
    if plan.id.is_empty() {
        return Err(KeeperError::Config("plan id is required".into()));
    }
    if plan.repo.is_empty() {
        return Err(KeeperError::Config(format!("plan {:?} has no repo", plan.id)));
    }
    Ok(())
}

fn apply_backup_progress(op: &mut Operation, entry: BackupProgressEntry) {
    if let Some(snapshot_id) = &entry.snapshot_id {
        op.snapshot_id = Some(snapshot_id.clone());
    }
    op.kind = OperationKind::Backup {
        last_status: Some(entry),
    };
}

/// Backs up `plan`, records the operation and indexes new snapshots.
///
/// Any failure fires the repo's `AnyError` hooks before it is returned.
pub(crate) async fn run_backup(
    cx: &TaskContext,
    plan: &PlanConfig,
    task_name: &str,
) -> Result<(), KeeperError> {
    validate_plan(plan)?;
    let result = backup_and_index(cx, plan).await;
    if let Err(err) = &result {
        run_failure_hooks(cx, &plan.repo, Some(plan), task_name, err, None).await;
    }
    result
}

async fn backup_and_index(cx: &TaskContext, plan: &PlanConfig) -> Result<(), KeeperError> {
    let op = Operation::backup(&plan.id, &plan.repo, cx.now_millis());
    let mut binding = OperationBinding::begin(cx.oplog().clone(), cx.clock().clone(), op).await?;
    let result = catch_panic(backup_with_progress(cx, plan, &mut binding)).await;
    binding.finish(result).await?;

    index_snapshots(cx, plan).await?;
    Ok(())
}

async fn backup_with_progress(
    cx: &TaskContext,
    plan: &PlanConfig,
    binding: &mut OperationBinding,
) -> Result<(), KeeperError> {
    let repo = cx.get_repo(&plan.repo).await?;

    let reporter = ProgressReporter::spawn(
        cx.oplog().clone(),
        binding.operation().clone(),
        cx.settings().backup_progress_interval,
        apply_backup_progress,
    );
    let report = |entry: BackupProgressEntry| reporter.report(entry);
    let result = catch_panic(async {
        repo.backup(&cx.cancel, plan, &report)
            .await
            .map_err(|e| KeeperError::execution(format!("backup of plan {:?}", plan.id), e))
    })
    .await;
    if let Some(last) = reporter.close().await {
        apply_backup_progress(binding.operation_mut(), last);
    }

    let summary = result?;
    tracing::debug!(
        plan = %plan.id,
        snapshot = ?summary.snapshot_id,
        files = summary.files_done,
        bytes = summary.bytes_done,
        "backup summary"
    );
    apply_backup_progress(binding.operation_mut(), summary);
    Ok(())
}

/// Records every snapshot of `plan` the log does not know about yet.
///
/// Returns how many snapshots were newly indexed. Calling it again with the
/// same snapshots adds nothing.
pub async fn index_snapshots(cx: &TaskContext, plan: &PlanConfig) -> Result<usize, KeeperError> {
    let repo = cx.get_repo(&plan.repo).await?;
    let snapshots = repo
        .snapshots_for_plan(&cx.cancel, plan)
        .await
        .map_err(|e| {
            KeeperError::execution(format!("listing snapshots of plan {:?}", plan.id), e)
        })?;

    let now = cx.now_millis();
    let mut seen = HashSet::new();
    let mut batch = Vec::new();
    for snapshot in snapshots {
        if !seen.insert(snapshot.id.clone()) {
            continue;
        }
        if cx.oplog().has_indexed_snapshot(&snapshot.id).await?.is_some() {
            continue;
        }
        batch.push(Operation::indexed_snapshot(&plan.id, &plan.repo, snapshot, now));
    }

    if batch.is_empty() {
        tracing::debug!(plan = %plan.id, "no new snapshots to index");
        return Ok(0);
    }
    cx.oplog().bulk_add(&mut batch).await?;
    tracing::debug!(plan = %plan.id, indexed = batch.len(), "indexed snapshots");
    Ok(batch.len())
}
