//! In-process [`MetadataService`] backed by a `parking_lot::RwLock`.
//!
//! Used by unit and integration tests across the workspace in place of a
//! real SQLite connection. Implements the exact same TTL and view
//! semantics as [`crate::sqlite::SqliteMetadataService`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hafiz_core::types::{ViewParams, ViewResult};
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{MetadataError, Result};
use crate::service::{KvDocument, MetadataService};
use crate::views::compute_view;

#[derive(Default)]
pub struct InMemoryMetadataService {
    docs: RwLock<HashMap<String, KvDocument>>,
}

impl InMemoryMetadataService {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_docs(&self) -> Vec<KvDocument> {
        let now = Utc::now();
        self.docs.read().values().filter(|d| d.is_live(now)).cloned().collect()
    }
}

#[async_trait]
impl MetadataService for InMemoryMetadataService {
    async fn add(&self, key: &str, doc_type: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let now = Utc::now();
        let mut docs = self.docs.write();
        if let Some(existing) = docs.get(key) {
            if existing.is_live(now) {
                return Err(MetadataError::AlreadyExists(key.to_string()));
            }
        }
        let expires_at = ttl.and_then(|d| chrono::Duration::from_std(d).ok()).map(|d| now + d);
        docs.insert(
            key.to_string(),
            KvDocument {
                key: key.to_string(),
                doc_type: doc_type.to_string(),
                value,
                expires_at,
            },
        );
        Ok(())
    }

    async fn set(&self, key: &str, doc_type: &str, value: Value) -> Result<()> {
        self.docs.write().insert(
            key.to_string(),
            KvDocument {
                key: key.to_string(),
                doc_type: doc_type.to_string(),
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.docs.write().remove(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = Utc::now();
        Ok(self.docs.read().get(key).filter(|d| d.is_live(now)).map(|d| d.value.clone()))
    }

    async fn view(&self, _design: &str, name: &str, params: &ViewParams) -> Result<ViewResult> {
        Ok(compute_view(name, params, &self.live_docs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn add_fails_when_key_already_live() {
        let svc = InMemoryMetadataService::new();
        svc.add("/k", "job", json!({}), None).await.unwrap();
        let err = svc.add("/k", "job", json!({}), None).await.unwrap_err();
        assert!(matches!(err, MetadataError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn add_succeeds_after_expiry() {
        let svc = InMemoryMetadataService::new();
        svc.add("/k", "job", json!({}), Some(Duration::from_millis(1))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        svc.add("/k", "job", json!({}), None).await.unwrap();
    }

    #[tokio::test]
    async fn set_overwrites_unconditionally() {
        let svc = InMemoryMetadataService::new();
        svc.set("/k", "node", json!({"n": 1})).await.unwrap();
        svc.set("/k", "node", json!({"n": 2})).await.unwrap();
        assert_eq!(svc.get("/k").await.unwrap(), Some(json!({"n": 2})));
    }

    #[tokio::test]
    async fn delete_missing_key_is_not_an_error() {
        let svc = InMemoryMetadataService::new();
        svc.delete("/missing").await.unwrap();
    }
}
