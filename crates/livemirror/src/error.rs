use std::path::PathBuf;

use liveosc::GatewayError;
use thiserror::Error;

/// Errors surfaced by the session mirror.
#[derive(Debug, Error)]
pub enum LiveError {
    /// The transport failed: nothing listening, no reply, socket trouble.
    #[error("connection to Live failed: {0}")]
    Connection(#[from] GatewayError),

    /// Live answered but reported no tracks or scenes.
    #[error("Live reported an empty session (is a set open and LiveOSC enabled?)")]
    NotConnected,

    #[error("unexpected reply on {address}: {reason}")]
    UnexpectedResponse { address: String, reason: String },

    /// A scan saw inconsistent counts from Live; the mirror can't be trusted.
    #[error("scan integrity check failed: {0}")]
    ScanIntegrity(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("snapshot {path} unusable: {reason}")]
    Snapshot { path: PathBuf, reason: String },
}

impl LiveError {
    /// True when the failure means Live is unreachable or not answering.
    pub fn is_connection(&self) -> bool {
        match self {
            LiveError::Connection(e) => e.is_connection(),
            LiveError::NotConnected => true,
            _ => false,
        }
    }

    pub(crate) fn unexpected(address: &str, reason: impl Into<String>) -> Self {
        LiveError::UnexpectedResponse {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LiveError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LiveError>;
