//! Ports - interfaces to the collaborators outside the orchestration core.
//!
//! The operation log, the repositories (and the archival tool behind them)
//! and the hook executor are all consumed through the traits below, which
//! keeps the scheduler testable with in-memory fakes.

pub mod clock;
pub mod hooks;
pub mod id_generator;
pub mod oplog;
pub mod repository;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::hooks::{HookCondition, HookExecutor, HookVars};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::oplog::OperationLog;
pub use self::repository::{ProgressFn, Repository, RepositoryOpener};
