use thiserror::Error;

/// Errors the protocol engine can hit while servicing one connection. Each
/// variant records whether the connection should stay open (the sender just
/// gets a NACK) or be torn down.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid filename: {0}")]
    InvalidFilename(#[from] crate::model::filename::FilenameError),

    #[error("session full for this user")]
    SessionFull,

    #[error("unexpected frame for the current state")]
    UnexpectedFrame,

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Transport(#[from] crate::connection::TransportError),
}

impl ServerError {
    /// Whether this error should close the connection outright rather than
    /// just NACK the offending request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServerError::SessionFull | ServerError::Transport(_))
    }
}
