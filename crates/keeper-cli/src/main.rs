mod cli;
mod hooks;
mod simulated;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use keeper_core::domain::OperationStatus;
use keeper_core::impls::{InMemoryOperationLog, count_by_status};
use keeper_core::tasks::{OneoffBackupTask, OneoffRestoreTask, RestoreTaskOpts, Task, TaskContext};
use keeper_core::{
    Config, KeeperError, Orchestrator, OrchestratorBuilder, OrchestratorSettings, Priority,
};

use crate::cli::{Cli, Command};
use crate::hooks::LogHookExecutor;
use crate::simulated::SimulatedOpener;

/// Signals `done` after every run of the wrapped task.
struct NotifyOnRun<T> {
    inner: T,
    done: Arc<Notify>,
}

#[async_trait]
impl<T: Task> Task for NotifyOnRun<T> {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn next(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.inner.next(now)
    }

    async fn prepare(&mut self, at: DateTime<Utc>, cx: &TaskContext) -> Result<(), KeeperError> {
        self.inner.prepare(at, cx).await
    }

    async fn run(&mut self, cx: &TaskContext) -> Result<(), KeeperError> {
        let result = self.inner.run(cx).await;
        self.done.notify_one();
        result
    }

    async fn discard(&mut self, reason: &str, cx: &TaskContext) -> Result<(), KeeperError> {
        let result = self.inner.discard(reason, cx).await;
        self.done.notify_one();
        result
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let raw = tokio::fs::read_to_string(&cli.config)
        .await
        .with_context(|| format!("failed to read {}", cli.config.display()))?;
    let config = Config::from_json(&raw).context("failed to parse config")?;

    let log = Arc::new(InMemoryOperationLog::new());
    let orchestrator = Arc::new(
        OrchestratorBuilder::new()
            .config(config.clone())
            .oplog(log.clone())
            .opener(Arc::new(SimulatedOpener {
                step: Duration::from_millis(100),
            }))
            .hooks(Arc::new(LogHookExecutor))
            .settings(OrchestratorSettings {
                max_concurrent_tasks: cli.max_concurrent,
                ..OrchestratorSettings::default()
            })
            .build()?,
    );

    let cancel = CancellationToken::new();
    let scheduler = tokio::spawn({
        let orchestrator = orchestrator.clone();
        let cancel = cancel.clone();
        async move { orchestrator.run(cancel).await }
    });

    let outcome = drive(cli.command, &config, &orchestrator).await;

    cancel.cancel();
    scheduler.await.context("scheduler task failed")?;
    outcome?;

    let ops = log.list();
    for op in &ops {
        println!("{}", serde_json::to_string(op)?);
    }
    let counts = count_by_status(&ops);
    println!("operations by status: {counts:?}");
    if counts.contains_key(&OperationStatus::Error) {
        bail!("{} operation(s) failed", counts[&OperationStatus::Error]);
    }
    Ok(())
}

async fn drive(
    command: Command,
    config: &Config,
    orchestrator: &Orchestrator,
) -> anyhow::Result<()> {
    match command {
        Command::Run { seconds } => {
            let queued = orchestrator.schedule_default_tasks().await?;
            println!("scheduled {queued} backup plan(s), press Ctrl-C to stop");
            match seconds {
                Some(secs) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                    }
                }
                None => tokio::signal::ctrl_c().await?,
            }
            println!("pending at shutdown: {:?}", orchestrator.pending_tasks());
        }
        Command::Backup { plan } => {
            let plan = config
                .plan(&plan)
                .cloned()
                .with_context(|| format!("unknown plan {plan:?}"))?;
            let task = OneoffBackupTask::new(plan, Utc::now())?;
            run_once(orchestrator, task, Priority::Default).await?;
        }
        Command::Restore {
            repo,
            plan,
            snapshot,
            path,
            target,
        } => {
            let opts = RestoreTaskOpts {
                plan_id: plan,
                repo_id: repo,
                snapshot_id: snapshot,
                path,
                target,
            };
            let task = OneoffRestoreTask::new(opts, Utc::now())?;
            run_once(orchestrator, task, Priority::High).await?;
        }
    }
    Ok(())
}

/// Schedules `task` and waits for its run (or Ctrl-C).
async fn run_once<T: Task>(
    orchestrator: &Orchestrator,
    task: T,
    priority: Priority,
) -> anyhow::Result<()> {
    let done = Arc::new(Notify::new());
    let task = NotifyOnRun {
        inner: task,
        done: done.clone(),
    };
    if !orchestrator.schedule_task(Box::new(task), priority).await? {
        bail!("task has nothing to run");
    }
    tokio::select! {
        _ = done.notified() => {}
        _ = tokio::signal::ctrl_c() => println!("interrupted"),
    }
    Ok(())
}
