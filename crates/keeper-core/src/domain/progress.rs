//! Progress and result payloads reported by repositories.

use serde::{Deserialize, Serialize};

/// A status line emitted while a backup runs; the final one is the summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupProgressEntry {
    /// `"status"` while running, `"summary"` once finished.
    pub message_type: String,
    pub percent_done: f64,
    pub total_files: u64,
    pub files_done: u64,
    pub total_bytes: u64,
    pub bytes_done: u64,
    /// Set on the summary entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
}

impl BackupProgressEntry {
    pub fn is_summary(&self) -> bool {
        self.message_type == "summary"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreProgressEntry {
    pub message_type: String,
    pub percent_done: f64,
    pub total_files: u64,
    pub files_restored: u64,
    pub total_bytes: u64,
    pub bytes_restored: u64,
    pub seconds_elapsed: f64,
}

/// A snapshot as listed by a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub unix_time_ms: i64,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}
