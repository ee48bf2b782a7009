//! A repository that pretends to back up and restore.
//!
//! Each backup walks through ten progress steps and records a new snapshot
//! for its plan, which is enough to watch the scheduler, the progress writes
//! and the snapshot indexing work end to end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use keeper_core::config::{PlanConfig, RepoConfig};
use keeper_core::domain::{BackupProgressEntry, RestoreProgressEntry, Snapshot};
use keeper_core::error::{CommandError, ExecError};
use keeper_core::ports::{ProgressFn, Repository, RepositoryOpener};

const STEPS: u64 = 10;

pub struct SimulatedRepository {
    config: RepoConfig,
    step: Duration,
    /// plan id -> snapshots, oldest first.
    snapshots: Mutex<HashMap<String, Vec<Snapshot>>>,
}

impl SimulatedRepository {
    pub fn new(config: RepoConfig, step: Duration) -> Self {
        Self {
            config,
            step,
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    fn find_snapshot(&self, snapshot_id: &str) -> Option<Snapshot> {
        self.snapshots
            .lock()
            .values()
            .flatten()
            .find(|s| s.id == snapshot_id)
            .cloned()
    }

    async fn tick(&self, cancel: &CancellationToken) -> Result<(), ExecError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ExecError::Cancelled),
            _ = tokio::time::sleep(self.step) => Ok(()),
        }
    }
}

#[async_trait]
impl Repository for SimulatedRepository {
    fn config(&self) -> &RepoConfig {
        &self.config
    }

    async fn backup(
        &self,
        cancel: &CancellationToken,
        plan: &PlanConfig,
        progress: ProgressFn<'_, BackupProgressEntry>,
    ) -> Result<BackupProgressEntry, ExecError> {
        if plan.paths.is_empty() {
            return Err(CommandError::new(
                format!("backup --repo {}", self.config.uri),
                "exit status 1",
                "Fatal: nothing to backup, please specify source files/dirs",
            )
            .into());
        }
        let total_files = 100 * plan.paths.len() as u64;
        let total_bytes = total_files * 4096;

        for step in 1..=STEPS {
            self.tick(cancel).await?;
            progress(BackupProgressEntry {
                message_type: "status".to_string(),
                percent_done: step as f64 / STEPS as f64,
                total_files,
                files_done: total_files * step / STEPS,
                total_bytes,
                bytes_done: total_bytes * step / STEPS,
                snapshot_id: None,
            });
        }

        let snapshot = Snapshot {
            id: Ulid::new().to_string().to_lowercase(),
            unix_time_ms: Utc::now().timestamp_millis(),
            hostname: "localhost".to_string(),
            paths: plan.paths.clone(),
            tags: vec![format!("plan:{}", plan.id)],
        };
        let snapshot_id = snapshot.id.clone();
        self.snapshots
            .lock()
            .entry(plan.id.clone())
            .or_default()
            .push(snapshot);

        Ok(BackupProgressEntry {
            message_type: "summary".to_string(),
            percent_done: 1.0,
            total_files,
            files_done: total_files,
            total_bytes,
            bytes_done: total_bytes,
            snapshot_id: Some(snapshot_id),
        })
    }

    async fn restore(
        &self,
        cancel: &CancellationToken,
        snapshot_id: &str,
        path: &str,
        target: &str,
        progress: ProgressFn<'_, RestoreProgressEntry>,
    ) -> Result<RestoreProgressEntry, ExecError> {
        let Some(snapshot) = self.find_snapshot(snapshot_id) else {
            return Err(CommandError::new(
                format!("restore {snapshot_id}:{path} --target {target}"),
                "exit status 1",
                &format!("Fatal: no matching ID found for prefix {snapshot_id:?}"),
            )
            .into());
        };
        let total_files = 100 * snapshot.paths.len() as u64;
        let total_bytes = total_files * 4096;

        let started = tokio::time::Instant::now();
        for step in 1..=STEPS {
            self.tick(cancel).await?;
            progress(RestoreProgressEntry {
                message_type: "status".to_string(),
                percent_done: step as f64 / STEPS as f64,
                total_files,
                files_restored: total_files * step / STEPS,
                total_bytes,
                bytes_restored: total_bytes * step / STEPS,
                seconds_elapsed: started.elapsed().as_secs_f64(),
            });
        }

        Ok(RestoreProgressEntry {
            message_type: "summary".to_string(),
            percent_done: 1.0,
            total_files,
            files_restored: total_files,
            total_bytes,
            bytes_restored: total_bytes,
            seconds_elapsed: started.elapsed().as_secs_f64(),
        })
    }

    async fn snapshots_for_plan(
        &self,
        cancel: &CancellationToken,
        plan: &PlanConfig,
    ) -> Result<Vec<Snapshot>, ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        Ok(self
            .snapshots
            .lock()
            .get(&plan.id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Opens a [`SimulatedRepository`] for every `sim:` uri.
pub struct SimulatedOpener {
    pub step: Duration,
}

#[async_trait]
impl RepositoryOpener for SimulatedOpener {
    async fn open(&self, config: &RepoConfig) -> Result<Arc<dyn Repository>, ExecError> {
        if !config.uri.starts_with("sim:") {
            return Err(ExecError::Other(format!(
                "unsupported repository uri {:?}, expected sim:<name>",
                config.uri
            )));
        }
        Ok(Arc::new(SimulatedRepository::new(config.clone(), self.step)))
    }
}
