use std::any::Any;

use thiserror::Error;

use crate::domain::{OperationId, OperationStatus};

/// Maximum number of output bytes kept on a [`CommandError`].
pub const OUTPUT_BUFFER_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum KeeperError {
    /// A required field is missing or malformed. Raised before any side effect.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("{context}: {source}")]
    Execution {
        context: String,
        #[source]
        source: ExecError,
    },

    #[error("operation log: {0}")]
    Persistence(#[from] OpLogError),

    #[error("invalid schedule {expr:?}: {reason}")]
    Schedule { expr: String, reason: String },

    #[error("illegal operation status transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: OperationStatus,
        to: OperationStatus,
    },

    /// The task failed and the operation could not be finalized either.
    #[error("{error}; finalizing the operation also failed: {update}")]
    Finalize {
        error: Box<KeeperError>,
        update: OpLogError,
    },

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl KeeperError {
    pub fn execution(context: impl Into<String>, source: ExecError) -> Self {
        Self::Execution {
            context: context.into(),
            source,
        }
    }

    /// Wraps the payload of a caught panic.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Panicked(message)
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Execution { source, .. } => matches!(source, ExecError::Cancelled),
            Self::Finalize { error, .. } => error.is_cancelled(),
            _ => false,
        }
    }
}

/// Failure to resolve a repository handle.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("repo {0:?} not found")]
    NotFound(String),

    #[error("failed to open repo {repo_id:?}: {source}")]
    Open {
        repo_id: String,
        #[source]
        source: ExecError,
    },
}

/// Errors returned by an [`OperationLog`](crate::ports::OperationLog).
#[derive(Debug, Error)]
pub enum OpLogError {
    #[error("operation is missing required field {0}")]
    MissingField(&'static str),

    #[error("operation {0} not found")]
    NotFound(OperationId),

    #[error("operation {0} already exists")]
    AlreadyExists(OperationId),

    #[error("operation {0} is already finalized")]
    Finalized(OperationId),

    #[error("{0}")]
    Storage(String),
}

/// Errors produced by the archival tool behind a [`Repository`](crate::ports::Repository).
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("hook execution failed: {0}")]
pub struct HookError(pub String);

/// A failed invocation of the external archival tool.
///
/// Output is truncated to [`OUTPUT_BUFFER_LIMIT`] bytes so a runaway tool
/// cannot bloat the operation log through `display_message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    pub command: String,
    pub message: String,
    pub output: String,
}

impl CommandError {
    pub fn new(command: impl Into<String>, message: impl Into<String>, output: &str) -> Self {
        Self {
            command: command.into(),
            message: message.into(),
            output: truncate_output(output),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "command {:?} failed: {}", self.command, self.message)?;
        if !self.output.is_empty() {
            write!(f, "\nProcess STDOUT: \n{}", self.output)?;
        }
        Ok(())
    }
}

impl std::error::Error for CommandError {}

fn truncate_output(output: &str) -> String {
    if output.len() < OUTPUT_BUFFER_LIMIT {
        return output.to_string();
    }
    let mut end = OUTPUT_BUFFER_LIMIT;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n...[truncated]", &output[..end])
}
