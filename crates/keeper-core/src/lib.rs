//! keeper-core
//!
//! Scheduling core of a backup orchestrator.
//!
//! # Modules
//! - **domain**: operation records, progress payloads, ids
//! - **ports**: interfaces to the outside (operation log, repositories, hooks, clock)
//! - **queue**: time-ordered priority queue of pending tasks
//! - **tasks**: the `Task` trait and the backup/restore tasks built on it
//! - **app**: orchestrator, scheduler loop, builder
//! - **impls**: in-memory implementations for development and tests

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod tasks;

#[cfg(test)]
pub(crate) mod test_utils;

pub use app::{BuildError, Orchestrator, OrchestratorBuilder};
pub use config::{Config, OrchestratorSettings, PlanConfig, RepoConfig};
pub use error::KeeperError;
pub use queue::Priority;
