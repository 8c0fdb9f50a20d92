use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DavError>;

/// Store operation that fans out to every configured location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaOperation {
    Save,
    Delete,
}

impl fmt::Display for ReplicaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaOperation::Save => f.write_str("uploading"),
            ReplicaOperation::Delete => f.write_str("deleting"),
        }
    }
}

/// Why a single location rejected a replicated write or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    Status(u16),
    Transport(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Status(code) => write!(f, "status code {}", code),
            FailureCause::Transport(message) => write!(f, "transport error: {}", message),
        }
    }
}

#[derive(Error, Debug)]
pub enum DavError {
    #[error("Transport error: {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Replication failed: {operation} {url}: {cause}")]
    Replication {
        operation: ReplicaOperation,
        url: String,
        cause: FailureCause,
    },

    /// A read ended on any status other than 200, including 404.
    #[error("Error getting file {url}: status code {status}")]
    ReadFailed { url: String, status: u16 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DavError {
    /// Folds a transport failure into the replication failure of `operation`.
    pub(crate) fn into_replication(self, operation: ReplicaOperation, url: String) -> Self {
        match self {
            DavError::Transport { message, .. } => DavError::Replication {
                operation,
                url,
                cause: FailureCause::Transport(message),
            },
            DavError::Replication { .. } => self,
            other => DavError::Replication {
                operation,
                url,
                cause: FailureCause::Transport(other.to_string()),
            },
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, DavError::Transport { .. })
    }
}
