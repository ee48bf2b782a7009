//! Repository port - handle to a backup repository.
//!
//! Implementations drive the external archival tool. They are shared by
//! every task targeting the same repo id, so any locking the tool needs
//! against concurrent use of one repository lives behind this trait.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{PlanConfig, RepoConfig};
use crate::domain::{BackupProgressEntry, RestoreProgressEntry, Snapshot};
use crate::error::ExecError;

/// Progress callback handed to long running repository calls.
pub type ProgressFn<'a, P> = &'a (dyn Fn(P) + Send + Sync);

#[async_trait]
pub trait Repository: Send + Sync {
    fn config(&self) -> &RepoConfig;

    /// Backs up `plan`, reporting progress as it goes. Returns the summary.
    ///
    /// When `cancel` fires the tool must be stopped and
    /// [`ExecError::Cancelled`] returned.
    async fn backup(
        &self,
        cancel: &CancellationToken,
        plan: &PlanConfig,
        progress: ProgressFn<'_, BackupProgressEntry>,
    ) -> Result<BackupProgressEntry, ExecError>;

    async fn restore(
        &self,
        cancel: &CancellationToken,
        snapshot_id: &str,
        path: &str,
        target: &str,
        progress: ProgressFn<'_, RestoreProgressEntry>,
    ) -> Result<RestoreProgressEntry, ExecError>;

    async fn snapshots_for_plan(
        &self,
        cancel: &CancellationToken,
        plan: &PlanConfig,
    ) -> Result<Vec<Snapshot>, ExecError>;
}

/// Opens repository handles on first use.
#[async_trait]
pub trait RepositoryOpener: Send + Sync {
    async fn open(&self, config: &RepoConfig) -> Result<Arc<dyn Repository>, ExecError>;
}
