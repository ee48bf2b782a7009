//! Schedulable units of work.
//!
//! A [`Task`] answers two questions: when it wants to run next, and what it
//! does when it runs. The orchestrator owns the rest (ordering, waiting,
//! re-enqueueing). Three kinds ship with the crate:
//! - [`ScheduledBackupTask`]: recurring backup driven by a cron expression
//! - [`OneoffBackupTask`]: a single backup at a given time
//! - [`OneoffRestoreTask`]: a single restore at a given time
//!
//! All of them record their work through an [`OperationBinding`].

pub mod backup;
pub mod operation;
pub mod progress;
pub mod restore;
pub mod schedule;

pub use self::backup::{OneoffBackupTask, ScheduledBackupTask};
pub use self::operation::OperationBinding;
pub use self::progress::ProgressReporter;
pub use self::restore::{OneoffRestoreTask, RestoreTaskOpts};
pub use self::schedule::CronSchedule;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::app::RepoPool;
use crate::config::{OrchestratorSettings, PlanConfig, RepoConfig};
use crate::error::KeeperError;
use crate::ports::{Clock, HookCondition, HookExecutor, HookVars, OperationLog, Repository};

#[async_trait]
pub trait Task: Send + 'static {
    /// Human readable name, stable for the lifetime of the task.
    fn name(&self) -> String;

    /// When the task wants to run next, or `None` once it is exhausted.
    fn next(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>>;

    /// Called after `next` returned `at`, before the task is queued.
    ///
    /// An error drops the task as if `next` had returned `None`.
    async fn prepare(&mut self, _at: DateTime<Utc>, _cx: &TaskContext) -> Result<(), KeeperError> {
        Ok(())
    }

    /// Executes the work. Long running implementations must watch
    /// `cx.cancel`.
    async fn run(&mut self, cx: &TaskContext) -> Result<(), KeeperError>;

    /// Called when the task is dropped from the queue without running, e.g.
    /// on config reload. Tasks that recorded something in `prepare` close it
    /// here.
    async fn discard(&mut self, _reason: &str, _cx: &TaskContext) -> Result<(), KeeperError> {
        Ok(())
    }
}

/// Everything a running task may touch.
#[derive(Clone)]
pub struct TaskContext {
    /// Fires on orchestrator shutdown.
    pub cancel: CancellationToken,
    oplog: Arc<dyn OperationLog>,
    hooks: Arc<dyn HookExecutor>,
    clock: Arc<dyn Clock>,
    repos: Arc<RepoPool>,
    settings: Arc<OrchestratorSettings>,
}

impl TaskContext {
    pub(crate) fn new(
        oplog: Arc<dyn OperationLog>,
        hooks: Arc<dyn HookExecutor>,
        clock: Arc<dyn Clock>,
        repos: Arc<RepoPool>,
        settings: Arc<OrchestratorSettings>,
    ) -> Self {
        Self {
            cancel: CancellationToken::new(),
            oplog,
            hooks,
            clock,
            repos,
            settings,
        }
    }

    /// The same context observing a different cancellation token.
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn oplog(&self) -> &Arc<dyn OperationLog> {
        &self.oplog
    }

    pub fn hooks(&self) -> &Arc<dyn HookExecutor> {
        &self.hooks
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Resolves a pooled repository handle.
    pub async fn get_repo(&self, repo_id: &str) -> Result<Arc<dyn Repository>, KeeperError> {
        Ok(self.repos.get(repo_id).await?)
    }

    pub fn repo_config(&self, repo_id: &str) -> Option<RepoConfig> {
        self.repos.config(repo_id)
    }
}

/// Runs the `AnyError` hooks of `repo_id` for a failed task.
///
/// Hook failures are logged; they never replace the task's own error.
pub(crate) async fn run_failure_hooks(
    cx: &TaskContext,
    repo_id: &str,
    plan: Option<&PlanConfig>,
    task_name: &str,
    error: &KeeperError,
    snapshot_id: Option<&str>,
) {
    if repo_id.is_empty() {
        return;
    }
    let Some(repo) = cx.repo_config(repo_id) else {
        tracing::warn!(task = %task_name, repo = %repo_id, "skipping hooks for unknown repo");
        return;
    };
    let vars = HookVars {
        task: task_name.to_string(),
        error: Some(error.to_string()),
        snapshot_id: snapshot_id.map(str::to_string),
    };
    if let Err(err) = cx
        .hooks()
        .execute_hooks(&repo, plan, &[HookCondition::AnyError], &vars)
        .await
    {
        tracing::warn!(task = %task_name, repo = %repo_id, error = %err, "failure hooks failed");
    }
}
