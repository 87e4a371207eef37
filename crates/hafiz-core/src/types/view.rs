//! Secondary-index view query/result shapes
//!
//! Mirrors the contractual shape the metadata service's views must return,
//! independent of how a given backend actually computes them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of a predefined secondary-index view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewName {
    /// Keyed by node identity; one row per blob owned by that node.
    NodeBlobs,
    /// Keyed by `(blobHash, tag, nodeId)`.
    FileBlobs,
    /// One row per blob with its current replica count (reduce), or its
    /// ownership record (non-reduce, `include_docs`).
    RepCounts,
    /// One row per live `NodeRecord`. Not part of the consumed-interface
    /// table; StaleNodeSweep needs some way to enumerate nodes and this is
    /// the natural secondary index for it.
    Nodes,
}

impl ViewName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewName::NodeBlobs => "node_blobs",
            ViewName::FileBlobs => "file_blobs",
            ViewName::RepCounts => "repcounts",
            ViewName::Nodes => "nodes",
        }
    }
}

/// Tag component of a `file_blobs` key. Lexicographic ordering
/// (`Blob` > `File`) is load-bearing for OrphanGC's descending scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileBlobsTag {
    File,
    Blob,
}

impl FileBlobsTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileBlobsTag::File => "file",
            FileBlobsTag::Blob => "blob",
        }
    }
}

/// Parameters accepted by a view query. Not every field applies to every
/// view; unused fields are ignored by the backend.
#[derive(Debug, Clone, Default)]
pub struct ViewParams {
    pub key: Option<Value>,
    pub start_key: Option<Value>,
    pub end_key: Option<Value>,
    pub limit: Option<u32>,
    pub descending: bool,
    pub reduce: bool,
    pub include_docs: bool,
    /// `false` forces the index to be current before responding
    /// ("non-stale read"). Any other value permits a stale read.
    pub stale: bool,
}

impl ViewParams {
    pub fn non_stale() -> Self {
        Self {
            stale: false,
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn include_docs(mut self) -> Self {
        self.include_docs = true;
        self
    }

    pub fn reduce(mut self) -> Self {
        self.reduce = true;
        self
    }

    pub fn key_range(mut self, start: Value, end: Value) -> Self {
        self.start_key = Some(start);
        self.end_key = Some(end);
        self
    }
}

/// One row returned by a view query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewRow {
    /// Document id, including the leading `/`.
    pub id: String,
    /// The emitted key (shape depends on the view).
    pub key: Value,
    /// The emitted value (shape depends on the view).
    pub value: Value,
    /// Present when `include_docs=true`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
}

/// An error reported against one node while computing a view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewRowError {
    pub from: String,
    pub reason: String,
}

/// Result of a view query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewResult {
    pub rows: Vec<ViewRow>,
    #[serde(default)]
    pub errors: Vec<ViewRowError>,
}

impl ViewResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Strip the leading `/` a view `Id` always carries.
    pub fn strip_id_prefix(id: &str) -> &str {
        id.strip_prefix('/').unwrap_or(id)
    }
}
