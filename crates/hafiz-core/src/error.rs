//! Error types for Hafiz

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Local free-space reporting is unsupported on this platform. The
    /// heartbeat loop recognizes this sentinel and does not log it.
    #[error("free space reporting is unsupported on this filesystem")]
    FreeSpaceUnsupported,

    #[error("blob not found: {0}")]
    NoSuchBlob(String),

    #[error("content hash mismatch: expected {expected}, got {got}")]
    HashMismatch { expected: String, got: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("storage backend error: {0}")]
    StorageError(String),

    #[error("internal server error: {0}")]
    InternalError(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
