//! SchedulerLoop - waits for the next due task and dispatches it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::KeeperError;
use crate::ports::Clock;
use crate::queue::{Priority, ReadyTask, TaskQueue};
use crate::tasks::{Task, TaskContext};

/// One run of the scheduler.
///
/// Flow per iteration:
/// 1. peek the earliest deadline
/// 2. sleep until it passes, a push arrives, or `cancel` fires
/// 3. while a task is due: take a permit, pop the most urgent due task,
///    spawn it
///
/// The permit is taken before the pop, so with every slot busy nothing is
/// held outside the queue and a task pushed meanwhile still competes on
/// priority. Shutdown while waiting for a permit leaves the due tasks queued.
/// `run` returns once the loop stopped and every execution finished.
pub(crate) struct SchedulerLoop {
    pub(crate) queue: Arc<TaskQueue>,
    pub(crate) cx: TaskContext,
    pub(crate) permits: Arc<Semaphore>,
    /// Bumped on config reload; executions from an older generation are not
    /// re-enqueued.
    pub(crate) generation: Arc<AtomicU64>,
}

impl SchedulerLoop {
    pub(crate) async fn run(self, cancel: CancellationToken) {
        let tracker = TaskTracker::new();
        tracing::info!(pending = self.queue.len(), "scheduler started");

        'outer: loop {
            let deadline = self.queue.peek_deadline();
            let notified = self.queue.notified();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = notified => {}
                _ = sleep_until(deadline, self.cx.clock().as_ref()) => {}
            }

            while self.is_due() {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'outer,
                    permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break 'outer,
                    },
                };
                // Re-read the clock: the wait for a permit may have been long.
                let Some(ready) = self.queue.pop_next_ready(self.cx.now()) else {
                    break;
                };
                self.spawn(ready, permit, &tracker, &cancel);
            }
        }

        tracker.close();
        if !tracker.is_empty() {
            tracing::info!(running = tracker.len(), "waiting for running tasks");
        }
        tracker.wait().await;
        tracing::info!(pending = self.queue.len(), "scheduler stopped");
    }

    fn is_due(&self) -> bool {
        self.queue
            .peek_deadline()
            .is_some_and(|at| at <= self.cx.now())
    }

    fn spawn(
        &self,
        ready: ReadyTask,
        permit: OwnedSemaphorePermit,
        tracker: &TaskTracker,
        cancel: &CancellationToken,
    ) {
        let cx = self.cx.with_cancel(cancel.child_token());
        let queue = Arc::clone(&self.queue);
        let generation = Arc::clone(&self.generation);
        let started_in = generation.load(Ordering::Acquire);
        tracker.spawn(async move {
            let task = execute(ready.task, &cx).await;
            drop(permit);
            if generation.load(Ordering::Acquire) != started_in {
                tracing::debug!(task = %task.name(), "config changed while running, dropping task");
                return;
            }
            if let Err(err) = enqueue(task, ready.priority, &cx, &queue).await {
                tracing::error!(error = %err, "failed to reschedule task");
            }
        });
    }
}

/// Runs one task to completion, containing errors and panics.
async fn execute(mut task: Box<dyn Task>, cx: &TaskContext) -> Box<dyn Task> {
    let name = task.name();
    tracing::info!(task = %name, "running task");
    let started = Instant::now();

    let outcome = AssertUnwindSafe(task.run(cx))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(KeeperError::from_panic(payload)));
    let duration_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(()) => tracing::info!(task = %name, duration_ms, "task finished"),
        Err(err) if err.is_cancelled() => {
            tracing::info!(task = %name, duration_ms, "task cancelled")
        }
        Err(err) => tracing::error!(task = %name, duration_ms, error = %err, "task failed"),
    }
    task
}

/// Asks `task` for its next run time and queues it.
///
/// Returns `Ok(false)` when the task is exhausted.
pub(crate) async fn enqueue(
    mut task: Box<dyn Task>,
    priority: Priority,
    cx: &TaskContext,
    queue: &TaskQueue,
) -> Result<bool, KeeperError> {
    let Some(at) = task.next(cx.now()) else {
        tracing::debug!(task = %task.name(), "task has no further runs");
        return Ok(false);
    };
    task.prepare(at, cx).await?;
    tracing::debug!(task = %task.name(), at = %at, ?priority, "task scheduled");
    queue.push(task, priority, at);
    Ok(true)
}

async fn sleep_until(deadline: Option<DateTime<Utc>>, clock: &dyn Clock) {
    match deadline {
        Some(at) => {
            let wait = (at - clock.now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
        }
        None => std::future::pending::<()>().await,
    }
}
