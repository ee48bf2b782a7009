//! OrchestratorBuilder - wiring and startup validation.
//!
//! Every problem that can be detected from the config alone (dangling repo
//! references, duplicate ids, malformed cron expressions) is reported by
//! `build()`, before anything is scheduled.

use std::collections::HashSet;
use std::sync::Arc;

use super::orchestrator::Orchestrator;
use super::repo_pool::RepoPool;
use crate::config::{Config, OrchestratorSettings};
use crate::impls::NoopHookExecutor;
use crate::ports::{Clock, HookExecutor, OperationLog, RepositoryOpener, SystemClock};
use crate::tasks::{CronSchedule, TaskContext};

/// Builds an [`Orchestrator`].
///
/// # Example
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new()
///     .config(config)
///     .oplog(Arc::new(InMemoryOperationLog::new()))
///     .opener(Arc::new(MyOpener))
///     .build()?;
/// ```
///
/// The operation log and the repository opener are required; hooks default
/// to [`NoopHookExecutor`] and the clock to [`SystemClock`].
pub struct OrchestratorBuilder {
    config: Config,
    oplog: Option<Arc<dyn OperationLog>>,
    opener: Option<Arc<dyn RepositoryOpener>>,
    hooks: Arc<dyn HookExecutor>,
    clock: Arc<dyn Clock>,
    settings: OrchestratorSettings,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("an operation log is required")]
    MissingOperationLog,

    #[error("a repository opener is required")]
    MissingRepositoryOpener,

    #[error("repo id {0:?} is defined more than once")]
    DuplicateRepo(String),

    #[error("plan id {0:?} is defined more than once")]
    DuplicatePlan(String),

    #[error("{0} has an empty id")]
    EmptyId(&'static str),

    #[error("plan {plan:?} references unknown repo {repo:?}")]
    UnknownRepo { plan: String, repo: String },

    #[error("plan {plan:?} has an invalid schedule: {reason}")]
    InvalidSchedule { plan: String, reason: String },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            oplog: None,
            opener: None,
            hooks: Arc::new(NoopHookExecutor),
            clock: Arc::new(SystemClock),
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn oplog(mut self, oplog: Arc<dyn OperationLog>) -> Self {
        self.oplog = Some(oplog);
        self
    }

    pub fn opener(mut self, opener: Arc<dyn RepositoryOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn HookExecutor>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<Orchestrator, BuildError> {
        let oplog = self.oplog.ok_or(BuildError::MissingOperationLog)?;
        let opener = self.opener.ok_or(BuildError::MissingRepositoryOpener)?;
        if self.settings.max_concurrent_tasks == 0 {
            return Err(BuildError::InvalidSettings(
                "max_concurrent_tasks must be at least 1".into(),
            ));
        }
        validate_config(&self.config)?;

        let repos = Arc::new(RepoPool::new(opener, self.config.repos.iter().cloned()));
        let cx = TaskContext::new(
            oplog,
            self.hooks,
            self.clock,
            Arc::clone(&repos),
            Arc::new(self.settings),
        );
        Ok(Orchestrator::new(self.config, cx, repos))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks the invariants a config must hold before it is used.
pub(crate) fn validate_config(config: &Config) -> Result<(), BuildError> {
    let mut repo_ids = HashSet::new();
    for repo in &config.repos {
        if repo.id.is_empty() {
            return Err(BuildError::EmptyId("repo"));
        }
        if !repo_ids.insert(repo.id.as_str()) {
            return Err(BuildError::DuplicateRepo(repo.id.clone()));
        }
    }

    let mut plan_ids = HashSet::new();
    for plan in &config.plans {
        if plan.id.is_empty() {
            return Err(BuildError::EmptyId("plan"));
        }
        if !plan_ids.insert(plan.id.as_str()) {
            return Err(BuildError::DuplicatePlan(plan.id.clone()));
        }
        if !repo_ids.contains(plan.repo.as_str()) {
            return Err(BuildError::UnknownRepo {
                plan: plan.id.clone(),
                repo: plan.repo.clone(),
            });
        }
        if let Some(expr) = &plan.cron {
            CronSchedule::parse(expr).map_err(|e| BuildError::InvalidSchedule {
                plan: plan.id.clone(),
                reason: e.to_string(),
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryOperationLog;
    use crate::test_utils::{FakeOpener, FakeRepository, plan_config, repo_config};

    fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
            .oplog(Arc::new(InMemoryOperationLog::new()))
            .opener(Arc::new(FakeOpener::new(Arc::new(FakeRepository::new(
                repo_config("repo"),
            )))))
    }

    fn config_with(plans: Vec<crate::config::PlanConfig>) -> Config {
        Config {
            repos: vec![repo_config("repo")],
            plans,
        }
    }

    #[test]
    fn test_build_success() {
        let mut plan = plan_config("plan", "repo");
        plan.cron = Some("0 * * * *".into());
        assert!(builder().config(config_with(vec![plan])).build().is_ok());
    }

    #[test]
    fn test_build_requires_oplog_and_opener() {
        assert!(matches!(
            OrchestratorBuilder::new().build(),
            Err(BuildError::MissingOperationLog)
        ));
        assert!(matches!(
            OrchestratorBuilder::new()
                .oplog(Arc::new(InMemoryOperationLog::new()))
                .build(),
            Err(BuildError::MissingRepositoryOpener)
        ));
    }

    #[test]
    fn test_build_unknown_repo() {
        let result = builder()
            .config(config_with(vec![plan_config("plan", "elsewhere")]))
            .build();
        assert!(matches!(
            result,
            Err(BuildError::UnknownRepo { plan, repo }) if plan == "plan" && repo == "elsewhere"
        ));
    }

    #[test]
    fn test_build_duplicate_ids() {
        let dup_plans = config_with(vec![plan_config("p", "repo"), plan_config("p", "repo")]);
        assert!(matches!(
            builder().config(dup_plans).build(),
            Err(BuildError::DuplicatePlan(id)) if id == "p"
        ));

        let dup_repos = Config {
            repos: vec![repo_config("r"), repo_config("r")],
            plans: vec![],
        };
        assert!(matches!(
            builder().config(dup_repos).build(),
            Err(BuildError::DuplicateRepo(id)) if id == "r"
        ));
    }

    #[test]
    fn test_build_invalid_cron() {
        let mut plan = plan_config("plan", "repo");
        plan.cron = Some("whenever".into());
        assert!(matches!(
            builder().config(config_with(vec![plan])).build(),
            Err(BuildError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn test_build_rejects_zero_concurrency() {
        let settings = OrchestratorSettings {
            max_concurrent_tasks: 0,
            ..OrchestratorSettings::default()
        };
        assert!(matches!(
            builder().settings(settings).build(),
            Err(BuildError::InvalidSettings(_))
        ));
    }
}
