//! App - the orchestration layer.
//!
//! This module wires the ports together and drives the scheduled work.
//!
//! # Main components
//! - **OrchestratorBuilder**: wiring and fail-fast validation
//! - **Orchestrator**: public surface (schedule, run, repo lookup, reload)
//! - **SchedulerLoop**: wait for the next deadline, dispatch, re-enqueue
//! - **RepoPool**: lazily opened, shared repository handles

pub mod builder;
pub mod orchestrator;
pub mod repo_pool;
mod scheduler_loop;

pub use self::builder::{BuildError, OrchestratorBuilder};
pub use self::orchestrator::Orchestrator;
pub use self::repo_pool::RepoPool;
