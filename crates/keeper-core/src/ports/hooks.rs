//! HookExecutor port - user-defined reactions to task events.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{PlanConfig, RepoConfig};
use crate::error::HookError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HookCondition {
    /// Any task targeting the repo failed.
    AnyError,
}

/// Variables exposed to hook templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookVars {
    pub task: String,
    pub error: Option<String>,
    pub snapshot_id: Option<String>,
}

#[async_trait]
pub trait HookExecutor: Send + Sync {
    async fn execute_hooks(
        &self,
        repo: &RepoConfig,
        plan: Option<&PlanConfig>,
        conditions: &[HookCondition],
        vars: &HookVars,
    ) -> Result<(), HookError>;
}
