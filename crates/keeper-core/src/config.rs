//! Repository and plan configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub repos: Vec<RepoConfig>,
    #[serde(default)]
    pub plans: Vec<PlanConfig>,
}

impl Config {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn repo(&self, id: &str) -> Option<&RepoConfig> {
        self.repos.iter().find(|r| r.id == id)
    }

    pub fn plan(&self, id: &str) -> Option<&PlanConfig> {
        self.plans.iter().find(|p| p.id == id)
    }
}

/// A backup repository the archival tool can talk to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub id: String,
    pub uri: String,
    /// `KEY=VALUE` pairs passed to the archival tool.
    #[serde(default)]
    pub env: Vec<String>,
}

/// What to back up, where, and how often.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanConfig {
    pub id: String,
    pub repo: String,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Cron expression; plans without one are only backed up on demand.
    #[serde(default)]
    pub cron: Option<String>,
}

/// Tuning knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Minimum spacing between progress writes of a running backup.
    pub backup_progress_interval: Duration,
    /// Minimum spacing between progress writes of a running restore.
    pub restore_progress_interval: Duration,
    /// Executions allowed to run at once. `1` runs tasks strictly one after
    /// another in dispatch order.
    pub max_concurrent_tasks: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            backup_progress_interval: Duration::from_millis(200),
            restore_progress_interval: Duration::from_secs(1),
            max_concurrent_tasks: 1,
        }
    }
}
