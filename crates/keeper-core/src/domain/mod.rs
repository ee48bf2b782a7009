//! Domain model: operation records, their ids and progress payloads.

pub mod ids;
pub mod operation;
pub mod progress;

pub use ids::{Id, IdMarker, OperationId};
pub use operation::{Operation, OperationKind, OperationStatus};
pub use progress::{BackupProgressEntry, RestoreProgressEntry, Snapshot};
