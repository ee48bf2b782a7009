use async_trait::async_trait;

use keeper_core::config::{PlanConfig, RepoConfig};
use keeper_core::error::HookError;
use keeper_core::ports::{HookCondition, HookExecutor, HookVars};

/// Reports hook conditions in the log instead of running commands.
pub struct LogHookExecutor;

#[async_trait]
impl HookExecutor for LogHookExecutor {
    async fn execute_hooks(
        &self,
        repo: &RepoConfig,
        plan: Option<&PlanConfig>,
        conditions: &[HookCondition],
        vars: &HookVars,
    ) -> Result<(), HookError> {
        tracing::warn!(
            repo = %repo.id,
            plan = plan.map(|p| p.id.as_str()).unwrap_or("-"),
            ?conditions,
            task = %vars.task,
            snapshot = vars.snapshot_id.as_deref().unwrap_or("-"),
            error = vars.error.as_deref().unwrap_or("-"),
            "hook triggered"
        );
        Ok(())
    }
}
