//! OrphanGC
//!
//! A blob is orphaned when no file references its hash any more, but a
//! node still carries an ownership record for it. `file_blobs`'s
//! descending scan interleaves `"file"` and `"blob"` rows for the same
//! hash with every file-tagged row preceding every blob-tagged row for
//! that hash, so a single watermark is enough to tell the two cases
//! apart: a blob-tagged row whose hash doesn't match the last file-tagged
//! hash seen has no surviving file reference.

use std::sync::Arc;

use hafiz_core::types::ViewParams;
use tracing::{info, warn};

use crate::context::ClusterContext;
use crate::error::{ClusterError, ClusterResult};

pub async fn collect(ctx: Arc<ClusterContext>) -> ClusterResult<()> {
    let limit = ctx.config_snapshot().gc_limit;

    let result = ctx
        .metadata
        .view("cluster", "file_blobs", &ViewParams::non_stale().descending().with_limit(limit))
        .await?;
    if result.has_errors() {
        let reason = result.errors.first().map(|e| e.reason.clone()).unwrap_or_default();
        return Err(ClusterError::ViewError { design: "file_blobs".to_string(), reason });
    }

    let mut last_file_blob: Option<String> = None;

    for row in result.rows {
        let Some(key) = row.key.as_array() else { continue };
        let (Some(hash), Some(tag)) = (key.first().and_then(|v| v.as_str()), key.get(1).and_then(|v| v.as_str())) else {
            continue;
        };

        match tag {
            "file" => last_file_blob = Some(hash.to_string()),
            "blob" => {
                if last_file_blob.as_deref() != Some(hash) {
                    let Some(owner) = key.get(2).and_then(|v| v.as_str()) else { continue };
                    delete_on_owner(&ctx, owner, hash).await;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

async fn delete_on_owner(ctx: &Arc<ClusterContext>, owner: &str, hash: &str) {
    if owner == ctx.node_id {
        if let Err(e) = ctx.blob_store.delete_blob(hash).await {
            warn!(%hash, error = %e, "failed to delete orphaned local blob");
            return;
        }
    } else {
        // No push RPC exists to tell a peer to delete; drop the
        // ownership record now and let the peer's own reconcile pass
        // notice the dangling claim against its local store.
        debug_assert!(owner != ctx.node_id);
    }

    let key = hafiz_core::types::BlobOwnershipRecord::key(hash);
    match ctx.metadata.get(&key).await {
        Ok(Some(doc)) => match serde_json::from_value::<hafiz_core::types::BlobOwnershipRecord>(doc) {
            Ok(mut record) => {
                record.remove_owner(owner);
                if let Err(e) = ctx.metadata.set(&key, "blob", serde_json::json!(record)).await {
                    warn!(%hash, error = %e, "failed to update ownership record after gc");
                } else {
                    info!(%hash, %owner, "collected orphaned blob replica");
                }
            }
            Err(e) => warn!(%hash, error = %e, "malformed ownership record during gc"),
        },
        Ok(None) => {}
        Err(e) => warn!(%hash, error = %e, "failed to read ownership record during gc"),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use hafiz_core::types::BlobOwnershipRecord;
    use hafiz_storage::BlobStore;
    use tempfile::tempdir;

    use super::*;
    use crate::stale_node_sweep::test_support::fixture;

    #[tokio::test]
    async fn referenced_blob_survives_collection() {
        let dir = tempdir().unwrap();
        let ctx = fixture("n1", dir.path()).await;

        let (hash, _) = ctx.blob_store.store_blob(Bytes::from_static(b"hello")).await.unwrap();
        let mut record = BlobOwnershipRecord::new(hash.clone(), 5);
        record.add_owner("n1".to_string());
        ctx.metadata.set(&BlobOwnershipRecord::key(&hash), "blob", serde_json::to_value(&record).unwrap()).await.unwrap();
        ctx.metadata
            .set("/file/1", "file_ref", serde_json::json!({ "blob_hashes": [hash] }))
            .await
            .unwrap();

        collect(Arc::clone(&ctx)).await.unwrap();

        assert!(ctx.blob_store.exists(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn unreferenced_blob_is_deleted_locally() {
        let dir = tempdir().unwrap();
        let ctx = fixture("n1", dir.path()).await;

        let (hash, _) = ctx.blob_store.store_blob(Bytes::from_static(b"orphan")).await.unwrap();
        let mut record = BlobOwnershipRecord::new(hash.clone(), 6);
        record.add_owner("n1".to_string());
        ctx.metadata.set(&BlobOwnershipRecord::key(&hash), "blob", serde_json::to_value(&record).unwrap()).await.unwrap();

        collect(Arc::clone(&ctx)).await.unwrap();

        assert!(!ctx.blob_store.exists(&hash).await.unwrap());
    }
}
