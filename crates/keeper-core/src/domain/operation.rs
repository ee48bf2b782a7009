//! Durable records of task executions.

use serde::{Deserialize, Serialize};

use super::ids::OperationId;
use super::progress::{BackupProgressEntry, RestoreProgressEntry, Snapshot};
use crate::error::KeeperError;

/// Status of an operation.
///
/// State transitions:
/// - Unknown -> Pending -> InProgress -> Success | Error
/// - Pending -> Error (queued, then dropped before it ran)
/// - Unknown -> InProgress (created when the run starts)
/// - Unknown -> Success (index records are written already finished)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    #[default]
    Unknown,
    Pending,
    #[serde(rename = "INPROGRESS")]
    InProgress,
    Success,
    Error,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationStatus::Success | OperationStatus::Error)
    }

    pub fn can_transition_to(self, next: OperationStatus) -> bool {
        use OperationStatus::*;
        matches!(
            (self, next),
            (Unknown, Pending)
                | (Unknown, InProgress)
                | (Unknown, Success)
                | (Pending, InProgress)
                | (Pending, Error)
                | (InProgress, Success)
                | (InProgress, Error)
        )
    }
}

/// Type-specific payload of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    Backup {
        last_status: Option<BackupProgressEntry>,
    },
    Restore {
        path: String,
        target: String,
        status: Option<RestoreProgressEntry>,
    },
    IndexSnapshot {
        snapshot: Snapshot,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Assigned by the operation log on `add`.
    pub id: Option<OperationId>,
    pub plan_id: String,
    pub repo_id: String,
    pub snapshot_id: Option<String>,
    pub unix_time_start_ms: i64,
    pub unix_time_end_ms: Option<i64>,
    pub status: OperationStatus,
    pub display_message: Option<String>,
    pub kind: OperationKind,
}

impl Operation {
    pub fn new(
        plan_id: impl Into<String>,
        repo_id: impl Into<String>,
        unix_time_start_ms: i64,
        kind: OperationKind,
    ) -> Self {
        Self {
            id: None,
            plan_id: plan_id.into(),
            repo_id: repo_id.into(),
            snapshot_id: None,
            unix_time_start_ms,
            unix_time_end_ms: None,
            status: OperationStatus::Unknown,
            display_message: None,
            kind,
        }
    }

    pub fn backup(plan_id: &str, repo_id: &str, unix_time_start_ms: i64) -> Self {
        Self::new(
            plan_id,
            repo_id,
            unix_time_start_ms,
            OperationKind::Backup { last_status: None },
        )
    }

    pub fn restore(
        plan_id: &str,
        repo_id: &str,
        snapshot_id: &str,
        path: &str,
        target: &str,
        unix_time_start_ms: i64,
    ) -> Self {
        let mut op = Self::new(
            plan_id,
            repo_id,
            unix_time_start_ms,
            OperationKind::Restore {
                path: path.to_string(),
                target: target.to_string(),
                status: None,
            },
        );
        op.snapshot_id = Some(snapshot_id.to_string());
        op
    }

    /// A finished record marking `snapshot` as known to the log.
    pub fn indexed_snapshot(plan_id: &str, repo_id: &str, snapshot: Snapshot, at_ms: i64) -> Self {
        let mut op = Self::new(plan_id, repo_id, at_ms, OperationKind::IndexSnapshot { snapshot });
        if let OperationKind::IndexSnapshot { snapshot } = &op.kind {
            op.snapshot_id = Some(snapshot.id.clone());
        }
        op.unix_time_end_ms = Some(at_ms);
        op.status = OperationStatus::Success;
        op
    }

    pub fn transition(&mut self, next: OperationStatus) -> Result<(), KeeperError> {
        if !self.status.can_transition_to(next) {
            return Err(KeeperError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// The snapshot indexed by this record, if it is an index record.
    pub fn indexed_snapshot_id(&self) -> Option<&str> {
        match &self.kind {
            OperationKind::IndexSnapshot { snapshot } => Some(snapshot.id.as_str()),
            _ => None,
        }
    }
}
