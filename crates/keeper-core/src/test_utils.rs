//! Fakes and fixtures shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::app::{Orchestrator, OrchestratorBuilder, RepoPool};
use crate::config::{Config, OrchestratorSettings, PlanConfig, RepoConfig};
use crate::domain::{BackupProgressEntry, Operation, OperationId, RestoreProgressEntry, Snapshot};
use crate::error::{ExecError, HookError, KeeperError, OpLogError};
use crate::impls::InMemoryOperationLog;
use crate::ports::{
    Clock, FixedClock, HookCondition, HookExecutor, HookVars, OperationLog, ProgressFn, Repository,
    RepositoryOpener,
};
use crate::tasks::{Task, TaskContext};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn repo_config(id: &str) -> RepoConfig {
    RepoConfig {
        id: id.to_string(),
        uri: format!("local:/tmp/{id}"),
        env: vec![],
    }
}

pub fn plan_config(id: &str, repo: &str) -> PlanConfig {
    PlanConfig {
        id: id.to_string(),
        repo: repo.to_string(),
        paths: vec!["/data".to_string()],
        excludes: vec![],
        cron: None,
    }
}

pub fn snapshot(id: &str) -> Snapshot {
    Snapshot {
        id: id.to_string(),
        unix_time_ms: 0,
        hostname: "host".to_string(),
        paths: vec!["/data".to_string()],
        tags: vec![],
    }
}

pub fn backup_entry(percent_done: f64) -> BackupProgressEntry {
    BackupProgressEntry {
        message_type: "status".to_string(),
        percent_done,
        ..BackupProgressEntry::default()
    }
}

/// Wall time that follows tokio's (pausable) clock.
pub struct TokioClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            base: t0(),
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::from_std(self.start.elapsed()).unwrap()
    }
}

type NextFn = Box<dyn FnMut(DateTime<Utc>) -> Option<DateTime<Utc>> + Send>;
type RunFn = Box<dyn FnMut(&TaskContext) -> BoxFuture<'static, Result<(), KeeperError>> + Send>;

/// A task assembled from closures.
pub struct FnTask {
    name: String,
    next: NextFn,
    run: RunFn,
    next_calls: Arc<AtomicUsize>,
}

impl FnTask {
    /// Never due, does nothing.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            next: Box::new(|_| None),
            run: Box::new(|_: &TaskContext| async { Ok::<(), KeeperError>(()) }.boxed()),
            next_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_next(
        mut self,
        next: impl FnMut(DateTime<Utc>) -> Option<DateTime<Utc>> + Send + 'static,
    ) -> Self {
        self.next = Box::new(next);
        self
    }

    /// Yields `times` in order, then is exhausted.
    pub fn with_times(self, times: Vec<DateTime<Utc>>) -> Self {
        let mut times = times.into_iter();
        self.with_next(move |_| times.next())
    }

    pub fn every(self, period: chrono::Duration) -> Self {
        self.with_next(move |now| Some(now + period))
    }

    pub fn on_run(
        mut self,
        run: impl FnMut(&TaskContext) -> BoxFuture<'static, Result<(), KeeperError>>
            + Send
            + 'static,
    ) -> Self {
        self.run = Box::new(run);
        self
    }

    pub fn next_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.next_calls)
    }
}

#[async_trait]
impl Task for FnTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn next(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_calls.fetch_add(1, Ordering::SeqCst);
        (self.next)(now)
    }

    async fn run(&mut self, cx: &TaskContext) -> Result<(), KeeperError> {
        (self.run)(cx).await
    }
}

/// In-memory log with injectable update failures and latency.
pub struct RecordingOpLog {
    inner: InMemoryOperationLog,
    fail_updates: AtomicBool,
    fail_bulk_adds: AtomicBool,
    update_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    updates: Mutex<Vec<Operation>>,
}

impl RecordingOpLog {
    pub fn new() -> Self {
        Self {
            inner: InMemoryOperationLog::new(),
            fail_updates: AtomicBool::new(false),
            fail_bulk_adds: AtomicBool::new(false),
            update_delay: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            updates: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_bulk_adds(&self, fail: bool) {
        self.fail_bulk_adds.store(fail, Ordering::SeqCst);
    }

    pub fn set_update_delay(&self, delay: Duration) {
        *self.update_delay.lock() = delay;
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Successful updates, in the order they landed.
    pub fn updates(&self) -> Vec<Operation> {
        self.updates.lock().clone()
    }
}

#[async_trait]
impl OperationLog for RecordingOpLog {
    async fn add(&self, op: &mut Operation) -> Result<(), OpLogError> {
        self.inner.add(op).await
    }

    async fn update(&self, op: &Operation) -> Result<(), OpLogError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(OpLogError::Storage("injected update failure".into()));
        }
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.update_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = self.inner.update(op).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if result.is_ok() {
            self.updates.lock().push(op.clone());
        }
        result
    }

    async fn bulk_add(&self, ops: &mut [Operation]) -> Result<(), OpLogError> {
        if self.fail_bulk_adds.load(Ordering::SeqCst) {
            return Err(OpLogError::Storage("injected bulk add failure".into()));
        }
        self.inner.bulk_add(ops).await
    }

    async fn has_indexed_snapshot(
        &self,
        snapshot_id: &str,
    ) -> Result<Option<OperationId>, OpLogError> {
        self.inner.has_indexed_snapshot(snapshot_id).await
    }
}

type ErrorFactory = Box<dyn Fn() -> ExecError + Send + Sync>;

/// Repository that answers from canned data.
///
/// Backups and restores report one progress entry (50%) after `delay`, then
/// fail, panic or succeed as configured. The delay watches the cancel token.
pub struct FakeRepository {
    config: RepoConfig,
    snapshots: Mutex<Vec<Snapshot>>,
    delay: Mutex<Duration>,
    panic_message: Mutex<Option<&'static str>>,
    backup_failure: Mutex<Option<ErrorFactory>>,
    restore_failure: Mutex<Option<ErrorFactory>>,
    listing_failure: Mutex<Option<ErrorFactory>>,
    restores: Mutex<Vec<(String, String, String)>>,
    backups: AtomicUsize,
}

impl FakeRepository {
    pub fn new(config: RepoConfig) -> Self {
        Self {
            config,
            snapshots: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            panic_message: Mutex::new(None),
            backup_failure: Mutex::new(None),
            restore_failure: Mutex::new(None),
            listing_failure: Mutex::new(None),
            restores: Mutex::new(Vec::new()),
            backups: AtomicUsize::new(0),
        }
    }

    pub fn set_snapshots(&self, snapshots: Vec<Snapshot>) {
        *self.snapshots.lock() = snapshots;
    }

    /// How long backups and restores take before their progress entry.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Backups and restores panic with `message` after their progress entry.
    pub fn panic_with(&self, message: &'static str) {
        *self.panic_message.lock() = Some(message);
    }

    pub fn fail_listing_with(&self, err: impl Fn() -> ExecError + Send + Sync + 'static) {
        *self.listing_failure.lock() = Some(Box::new(err));
    }

    pub fn fail_backups_with(&self, err: impl Fn() -> ExecError + Send + Sync + 'static) {
        *self.backup_failure.lock() = Some(Box::new(err));
    }

    pub fn fail_restores_with(&self, err: impl Fn() -> ExecError + Send + Sync + 'static) {
        *self.restore_failure.lock() = Some(Box::new(err));
    }

    /// `(snapshot, path, target)` of every successful restore.
    pub fn restores(&self) -> Vec<(String, String, String)> {
        self.restores.lock().clone()
    }

    pub fn backups(&self) -> usize {
        self.backups.load(Ordering::SeqCst)
    }

    fn injected(slot: &Mutex<Option<ErrorFactory>>) -> Option<ExecError> {
        slot.lock().as_ref().map(|make| make())
    }

    async fn work(&self, cancel: &CancellationToken) -> Result<(), ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ExecError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Ok(())
    }

    fn maybe_panic(&self) {
        let message = *self.panic_message.lock();
        if let Some(message) = message {
            panic!("{message}");
        }
    }
}

#[async_trait]
impl Repository for FakeRepository {
    fn config(&self) -> &RepoConfig {
        &self.config
    }

    async fn backup(
        &self,
        cancel: &CancellationToken,
        plan: &PlanConfig,
        progress: ProgressFn<'_, BackupProgressEntry>,
    ) -> Result<BackupProgressEntry, ExecError> {
        self.backups.fetch_add(1, Ordering::SeqCst);
        self.work(cancel).await?;
        progress(backup_entry(0.5));
        self.maybe_panic();
        if let Some(err) = Self::injected(&self.backup_failure) {
            return Err(err);
        }
        let files = plan.paths.len() as u64;
        Ok(BackupProgressEntry {
            message_type: "summary".to_string(),
            percent_done: 1.0,
            total_files: files,
            files_done: files,
            snapshot_id: Some("snap-final".to_string()),
            ..BackupProgressEntry::default()
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
        self.work(cancel).await?;
        progress(RestoreProgressEntry {
            message_type: "status".to_string(),
            percent_done: 0.5,
            ..RestoreProgressEntry::default()
        });
        self.maybe_panic();
        if let Some(err) = Self::injected(&self.restore_failure) {
            return Err(err);
        }
        self.restores
            .lock()
            .push((snapshot_id.to_string(), path.to_string(), target.to_string()));
        Ok(RestoreProgressEntry {
            message_type: "summary".to_string(),
            percent_done: 1.0,
            ..RestoreProgressEntry::default()
        })
    }

    async fn snapshots_for_plan(
        &self,
        cancel: &CancellationToken,
        _plan: &PlanConfig,
    ) -> Result<Vec<Snapshot>, ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        if let Some(err) = Self::injected(&self.listing_failure) {
            return Err(err);
        }
        Ok(self.snapshots.lock().clone())
    }
}

/// Hands out one shared [`FakeRepository`] and counts opens.
pub struct FakeOpener {
    repo: Arc<FakeRepository>,
    opens: AtomicUsize,
    failures: AtomicUsize,
    delays: Mutex<HashMap<String, Duration>>,
}

impl FakeOpener {
    pub fn new(repo: Arc<FakeRepository>) -> Self {
        Self {
            repo,
            opens: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            delays: Mutex::new(HashMap::new()),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn fail_next_opens(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn delay_opens_of(&self, repo_id: &str, delay: Duration) {
        self.delays.lock().insert(repo_id.to_string(), delay);
    }
}

#[async_trait]
impl RepositoryOpener for FakeOpener {
    async fn open(&self, config: &RepoConfig) -> Result<Arc<dyn Repository>, ExecError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().get(&config.id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ExecError::Other("injected open failure".into()));
        }
        let repo: Arc<dyn Repository> = self.repo.clone();
        Ok(repo)
    }
}

#[derive(Debug, Clone)]
pub struct HookCall {
    pub repo: String,
    pub plan: Option<String>,
    pub conditions: Vec<HookCondition>,
    pub vars: HookVars,
}

/// Records hook invocations; optionally fails them.
#[derive(Default)]
pub struct RecordingHooks {
    calls: Mutex<Vec<HookCall>>,
    fail: AtomicBool,
}

impl RecordingHooks {
    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl HookExecutor for RecordingHooks {
    async fn execute_hooks(
        &self,
        repo: &RepoConfig,
        plan: Option<&PlanConfig>,
        conditions: &[HookCondition],
        vars: &HookVars,
    ) -> Result<(), HookError> {
        self.calls.lock().push(HookCall {
            repo: repo.id.clone(),
            plan: plan.map(|p| p.id.clone()),
            conditions: conditions.to_vec(),
            vars: vars.clone(),
        });
        if self.fail.load(Ordering::SeqCst) {
            return Err(HookError("injected hook failure".into()));
        }
        Ok(())
    }
}

/// The fakes wired together around one repo (`"repo"`) and one plan
/// (`"plan"`).
pub struct Harness {
    pub log: Arc<InMemoryOperationLog>,
    pub repo: Arc<FakeRepository>,
    pub opener: Arc<FakeOpener>,
    pub hooks: Arc<RecordingHooks>,
    pub clock: Arc<FixedClock>,
    pub config: Config,
    pub cx: TaskContext,
}

impl Harness {
    pub fn new() -> Self {
        let config = Config {
            repos: vec![repo_config("repo")],
            plans: vec![plan_config("plan", "repo")],
        };
        let log = Arc::new(InMemoryOperationLog::new());
        let repo = Arc::new(FakeRepository::new(repo_config("repo")));
        let opener = Arc::new(FakeOpener::new(repo.clone()));
        let hooks = Arc::new(RecordingHooks::default());
        let clock = Arc::new(FixedClock::new(t0()));
        let cx = TaskContext::new(
            log.clone(),
            hooks.clone(),
            clock.clone(),
            Arc::new(RepoPool::new(opener.clone(), config.repos.clone())),
            Arc::new(OrchestratorSettings::default()),
        );
        Self {
            log,
            repo,
            opener,
            hooks,
            clock,
            config,
            cx,
        }
    }

    pub fn plan(&self) -> PlanConfig {
        self.config.plans[0].clone()
    }

    /// The harness context, writing to `log` instead.
    pub fn context_with_log(&self, log: Arc<dyn OperationLog>) -> TaskContext {
        TaskContext::new(
            log,
            self.hooks.clone(),
            self.clock.clone(),
            Arc::new(RepoPool::new(self.opener.clone(), self.config.repos.clone())),
            Arc::new(OrchestratorSettings::default()),
        )
    }

    /// A builder sharing this harness' log, repository and hooks.
    pub fn builder(&self, clock: Arc<dyn Clock>) -> OrchestratorBuilder {
        OrchestratorBuilder::new()
            .config(self.config.clone())
            .oplog(self.log.clone())
            .opener(self.opener.clone())
            .hooks(self.hooks.clone())
            .clock(clock)
    }

    pub fn orchestrator(&self, clock: Arc<dyn Clock>) -> Orchestrator {
        self.builder(clock).build().unwrap()
    }
}
