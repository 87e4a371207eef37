//! SQLite-backed [`MetadataService`]
//!
//! One table, `kv_documents`, holds every document type the
//! cluster-coordination core persists. `add` is a set-if-absent lease
//! implemented as `INSERT ... WHERE NOT EXISTS`; everything past its
//! `expires_at` reads as absent without a separate sweep.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hafiz_core::types::{ViewParams, ViewResult};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

use crate::error::{MetadataError, Result};
use crate::service::{KvDocument, MetadataService};
use crate::views::compute_view;

pub struct SqliteMetadataService {
    pool: SqlitePool,
}

impl SqliteMetadataService {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(20).connect(database_url).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_documents (
                key TEXT PRIMARY KEY,
                doc_type TEXT NOT NULL,
                value TEXT NOT NULL,
                expires_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_kv_documents_doc_type ON kv_documents(doc_type)")
            .execute(&self.pool)
            .await?;

        info!("metadata store initialized");
        Ok(())
    }

    async fn live_docs(&self) -> Result<Vec<KvDocument>> {
        let now = Utc::now().to_rfc3339();
        let rows = sqlx::query("SELECT key, doc_type, value, expires_at FROM kv_documents WHERE expires_at IS NULL OR expires_at > ?1")
            .bind(&now)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| -> Result<KvDocument> {
                let key: String = row.try_get("key")?;
                let doc_type: String = row.try_get("doc_type")?;
                let value: String = row.try_get("value")?;
                let expires_at: Option<String> = row.try_get("expires_at")?;
                Ok(KvDocument {
                    key,
                    doc_type,
                    value: serde_json::from_str(&value)?,
                    expires_at: expires_at.and_then(|s| DateTimeParse::parse(&s)),
                })
            })
            .collect()
    }
}

/// Thin wrapper so a malformed `expires_at` column degrades to "no expiry"
/// rather than failing the whole read.
struct DateTimeParse;
impl DateTimeParse {
    fn parse(s: &str) -> Option<chrono::DateTime<Utc>> {
        chrono::DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc))
    }
}

#[async_trait]
impl MetadataService for SqliteMetadataService {
    async fn add(&self, key: &str, doc_type: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let now = Utc::now();
        let expires_at = ttl.and_then(|d| chrono::Duration::from_std(d).ok()).map(|d| now + d);
        let value_text = serde_json::to_string(&value)?;
        let now_text = now.to_rfc3339();
        let expires_text = expires_at.map(|d| d.to_rfc3339());

        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO kv_documents (key, doc_type, value, expires_at)
            SELECT ?1, ?2, ?3, ?4
            WHERE NOT EXISTS (
                SELECT 1 FROM kv_documents WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?5)
            )
            "#,
        )
        .bind(key)
        .bind(doc_type)
        .bind(&value_text)
        .bind(&expires_text)
        .bind(&now_text)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::AlreadyExists(key.to_string()));
        }
        Ok(())
    }

    async fn set(&self, key: &str, doc_type: &str, value: Value) -> Result<()> {
        let value_text = serde_json::to_string(&value)?;
        sqlx::query("INSERT OR REPLACE INTO kv_documents (key, doc_type, value, expires_at) VALUES (?1, ?2, ?3, NULL)")
            .bind(key)
            .bind(doc_type)
            .bind(&value_text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_documents WHERE key = ?1").bind(key).execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query("SELECT value FROM kv_documents WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)")
            .bind(key)
            .bind(&now)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let value: String = row.try_get("value")?;
                Ok(Some(serde_json::from_str(&value)?))
            }
            None => Ok(None),
        }
    }

    async fn view(&self, _design: &str, name: &str, params: &ViewParams) -> Result<ViewResult> {
        let docs = self.live_docs().await?;
        Ok(compute_view(name, params, &docs))
    }
}
