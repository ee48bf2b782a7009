use async_trait::async_trait;

use crate::config::{PlanConfig, RepoConfig};
use crate::error::HookError;
use crate::ports::{HookCondition, HookExecutor, HookVars};

/// Hook executor used when no hooks are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHookExecutor;

#[async_trait]
impl HookExecutor for NoopHookExecutor {
    async fn execute_hooks(
        &self,
        _repo: &RepoConfig,
        _plan: Option<&PlanConfig>,
        _conditions: &[HookCondition],
        _vars: &HookVars,
    ) -> Result<(), HookError> {
        Ok(())
    }
}
