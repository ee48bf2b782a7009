//! In-process implementations of the ports.
//!
//! Production adapters (a database-backed log, a repository driving the
//! archival tool) live outside this crate.

pub mod inmem_oplog;
pub mod noop_hooks;

pub use self::inmem_oplog::{InMemoryOperationLog, count_by_status};
pub use self::noop_hooks::NoopHookExecutor;
