//! Orchestrator - owns the task queue and drives scheduled work.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::builder::validate_config;
use super::repo_pool::RepoPool;
use super::scheduler_loop::{SchedulerLoop, enqueue};
use crate::config::Config;
use crate::error::KeeperError;
use crate::observability::QueueCounts;
use crate::ports::Repository;
use crate::queue::{Priority, TaskQueue};
use crate::tasks::{ScheduledBackupTask, Task, TaskContext};

/// Entry point of the core.
///
/// Built by [`OrchestratorBuilder`](super::OrchestratorBuilder). All methods
/// take `&self`, so one instance can be shared (e.g. in an `Arc`) between
/// the task running [`Orchestrator::run`] and callers scheduling work.
pub struct Orchestrator {
    queue: Arc<TaskQueue>,
    cx: TaskContext,
    repos: Arc<RepoPool>,
    config: Mutex<Config>,
    permits: Arc<Semaphore>,
    generation: Arc<AtomicU64>,
}

impl Orchestrator {
    pub(crate) fn new(config: Config, cx: TaskContext, repos: Arc<RepoPool>) -> Self {
        let permits = Arc::new(Semaphore::new(cx.settings().max_concurrent_tasks));
        Self {
            queue: Arc::new(TaskQueue::new()),
            cx,
            repos,
            config: Mutex::new(config),
            permits,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queues `task` at the time it asks for.
    ///
    /// Returns `Ok(false)` if the task has no run left, in which case it is
    /// dropped.
    pub async fn schedule_task(
        &self,
        task: Box<dyn Task>,
        priority: Priority,
    ) -> Result<bool, KeeperError> {
        enqueue(task, priority, &self.cx, &self.queue).await
    }

    /// Runs the scheduler until `cancel` fires.
    ///
    /// Returns after every in-flight execution has finished; tasks that were
    /// not due stay queued.
    pub async fn run(&self, cancel: CancellationToken) {
        SchedulerLoop {
            queue: Arc::clone(&self.queue),
            cx: self.cx.clone(),
            permits: Arc::clone(&self.permits),
            generation: Arc::clone(&self.generation),
        }
        .run(cancel)
        .await
    }

    pub async fn get_repo(&self, repo_id: &str) -> Result<Arc<dyn Repository>, KeeperError> {
        self.cx.get_repo(repo_id).await
    }

    /// Queues a recurring backup for every plan that has a cron schedule.
    ///
    /// Returns how many tasks were queued.
    pub async fn schedule_default_tasks(&self) -> Result<usize, KeeperError> {
        let plans: Vec<_> = self
            .config
            .lock()
            .plans
            .iter()
            .filter(|p| p.cron.is_some())
            .cloned()
            .collect();

        let mut queued = 0;
        for plan in plans {
            let task = ScheduledBackupTask::new(plan)?;
            if self.schedule_task(Box::new(task), Priority::Default).await? {
                queued += 1;
            }
        }
        tracing::info!(queued, "scheduled default tasks");
        Ok(queued)
    }

    /// Swaps in a new config: drops every queued task and open repository,
    /// then schedules the default tasks of `config`.
    ///
    /// Dropped tasks get [`Task::discard`] first, so a queued restore closes
    /// its `PENDING` operation as `ERROR`. Tasks running at the time finish
    /// but are not queued again.
    pub async fn apply_config(&self, config: Config) -> Result<usize, KeeperError> {
        validate_config(&config).map_err(|e| KeeperError::Config(e.to_string()))?;

        self.generation.fetch_add(1, Ordering::AcqRel);
        let dropped = self.queue.reset();
        for mut ready in dropped {
            if let Err(err) = ready.task.discard("dropped by config reload", &self.cx).await {
                let task = ready.task.name();
                tracing::warn!(%task, error = %err, "failed to discard queued task");
            }
        }
        self.repos.replace_configs(config.repos.iter().cloned());
        *self.config.lock() = config;
        tracing::info!("applied new config");

        self.schedule_default_tasks().await
    }

    pub fn config(&self) -> Config {
        self.config.lock().clone()
    }

    pub fn pending_tasks(&self) -> QueueCounts {
        self.queue.counts()
    }

    pub fn context(&self) -> &TaskContext {
        &self.cx
    }
}
