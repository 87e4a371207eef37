//! Cluster-coordination error types

use thiserror::Error;

pub type ClusterResult<T> = Result<T, ClusterError>;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("node unreachable: {0}")]
    NodeUnreachable(String),

    #[error("lease contended: {0}")]
    LeaseContended(String),

    #[error("view error in {design}: {reason}")]
    ViewError { design: String, reason: String },

    #[error("checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: String, got: String },

    #[error("no salvage candidate available for {0}")]
    NoSalvageCandidate(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("metadata error: {0}")]
    Metadata(#[from] hafiz_metadata::MetadataError),

    #[error("storage error: {0}")]
    Storage(#[from] hafiz_core::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ClusterError {
    /// `Add` found an existing, live lease — not a failure, the caller
    /// should simply skip this round.
    pub fn is_lease_contention(&self) -> bool {
        matches!(self, ClusterError::LeaseContended(_))
            || matches!(self, ClusterError::Metadata(hafiz_metadata::MetadataError::AlreadyExists(_)))
    }
}
