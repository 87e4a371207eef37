//! Metadata service trait
//!
//! The cluster-coordination core's only dependency on durable storage: a
//! flat key space with set-if-absent leases, unconditional writes/deletes,
//! and a small family of secondary-index views. Implementations exist for
//! SQLite ([`crate::sqlite::SqliteMetadataService`]) and for tests
//! ([`crate::memory::InMemoryMetadataService`]).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hafiz_core::types::{ViewParams, ViewResult};
use serde_json::Value;

use crate::error::Result;

/// A single row in the flat metadata key space, as stored on disk. Shared
/// between backends so view computation lives in one place
/// ([`crate::views::compute_view`]) instead of being reimplemented per
/// backend.
#[derive(Debug, Clone)]
pub struct KvDocument {
    pub key: String,
    pub doc_type: String,
    pub value: Value,
    pub expires_at: Option<DateTime<Utc>>,
}

impl KvDocument {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) => exp > now,
            None => true,
        }
    }
}

#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Set-if-absent with an optional expiry. Fails with
    /// [`crate::error::MetadataError::AlreadyExists`] if a live document is
    /// already stored at `key`. Used as a distributed lease.
    async fn add(&self, key: &str, doc_type: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    /// Unconditional write, no expiry.
    async fn set(&self, key: &str, doc_type: &str, value: Value) -> Result<()>;

    /// Unconditional delete. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Read a single document by key. Expired documents read as absent.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Evaluate a named secondary-index view.
    async fn view(&self, design: &str, name: &str, params: &ViewParams) -> Result<ViewResult>;
}
