use crate::connection::TransportError;
use thiserror::Error;

/// Errors surfaced by client-side components: the reconciler, watcher,
/// listener, and interactive driver all funnel through this one type.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("server rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected frame for the current exchange")]
    UnexpectedFrame,

    #[error("path has no usable file name")]
    InvalidPath,

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid filename: {0}")]
    InvalidFilename(#[from] crate::model::filename::FilenameError),

    #[error("connection closed mid-exchange")]
    Closed,
}
