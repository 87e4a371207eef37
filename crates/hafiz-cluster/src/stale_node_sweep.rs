//! StaleNodeSweep
//!
//! Finds nodes that stopped heartbeating and unwinds their ownership
//! claims. Per-dead-node cleanups are spawned with `tokio::spawn`, the
//! same detached-task-per-event shape this workspace already used for
//! discovery events.

use std::sync::Arc;

use chrono::Utc;
use hafiz_core::types::{BlobOwnershipRecord, NodeId, NodeRecord, ViewParams};
use tracing::{info, warn};

use crate::context::ClusterContext;
use crate::error::{ClusterError, ClusterResult};
use crate::replica_repair::{pick_salvage_target, salvage_blob};

/// `StaleNodeCheckFreq`: list every known node and spawn a cleanup for
/// each one whose last heartbeat is older than `StaleNodeLimit`.
pub async fn sweep(ctx: Arc<ClusterContext>) -> ClusterResult<()> {
    let config = ctx.config_snapshot();
    let result = ctx.metadata.view("cluster", "nodes", &ViewParams::non_stale().include_docs()).await?;
    if result.has_errors() {
        let reason = result.errors.first().map(|e| e.reason.clone()).unwrap_or_default();
        return Err(ClusterError::ViewError { design: "nodes".to_string(), reason });
    }

    let now = Utc::now();
    for row in result.rows {
        let Some(doc) = row.doc else { continue };
        let node: NodeRecord = serde_json::from_value(doc)?;

        if !node.is_stale(now, config.stale_node_limit()) {
            continue;
        }
        if node.node_id == ctx.node_id {
            warn!(node_id = %node.node_id, "local heartbeat appears stale, skipping self-cleanup");
            continue;
        }

        let dead_id = node.node_id.clone();
        let node_clean_count = config.node_clean_count;
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(e) = cleanup_node(&ctx, &dead_id, node_clean_count).await {
                warn!(node_id = %dead_id, error = %e, "cleanup of dead node failed");
            }
        });
    }

    Ok(())
}

/// Strip a dead node's ownership from up to `limit` of its blobs, salvage
/// any that drop below `MinReplicas`, and once no more blobs reference it,
/// remove the node record itself.
async fn cleanup_node(ctx: &Arc<ClusterContext>, dead_node: &NodeId, limit: u32) -> ClusterResult<()> {
    let min_replicas = ctx.config_snapshot().min_replicas as usize;

    let mut params = ViewParams::non_stale().with_limit(limit);
    params.key = Some(serde_json::json!(dead_node));
    let result = ctx.metadata.view("cluster", "node_blobs", &params).await?;
    if result.has_errors() {
        let reason = result.errors.first().map(|e| e.reason.clone()).unwrap_or_default();
        return Err(ClusterError::ViewError { design: "node_blobs".to_string(), reason });
    }

    if result.rows.is_empty() {
        ctx.metadata.delete(&NodeRecord::key(dead_node)).await?;
        ctx.metadata.delete(&NodeRecord::replica_counter_key(dead_node)).await?;
        info!(node_id = %dead_node, "no remaining ownership claims, removed node record");
        return Ok(());
    }

    for row in result.rows {
        let Some(hash) = row.value.as_str().map(str::to_string) else {
            continue;
        };
        let key = BlobOwnershipRecord::key(&hash);
        let Some(doc) = ctx.metadata.get(&key).await? else {
            continue;
        };
        let mut record: BlobOwnershipRecord = serde_json::from_value(doc)?;
        if !record.owners.contains(dead_node) {
            continue;
        }
        record.remove_owner(dead_node);
        ctx.metadata.set(&key, "blob", serde_json::to_value(&record)?).await?;

        if record.replica_count() < min_replicas {
            match pick_salvage_target(ctx, &record.owners, Some(dead_node)).await {
                Ok(candidate) => salvage_blob(ctx, &hash, &record.owners, &candidate).await,
                Err(e) => warn!(%hash, error = %e, "no salvage candidate while cleaning up dead node"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use hafiz_core::ClusterCoreConfig;
    use hafiz_metadata::InMemoryMetadataService;
    use hafiz_storage::LocalBlobStore;

    use crate::context::ClusterContext;
    use crate::transport::{PeerTransport, TransportConfig};

    pub async fn fixture(node_id: &str, data_dir: &std::path::Path) -> Arc<ClusterContext> {
        let store = LocalBlobStore::new(data_dir, 1_000_000);
        store.init().await.expect("init blob store");

        let ctx = ClusterContext::new(
            node_id.to_string(),
            format!("{node_id}:9000"),
            "localhost".to_string(),
            1_000_000,
            4,
            1000,
            3,
            Arc::new(InMemoryMetadataService::default()),
            Arc::new(store),
            Arc::new(PeerTransport::new(TransportConfig::default()).expect("transport")),
        );
        *ctx.config.write() = ClusterCoreConfig::default();
        ctx
    }

    pub fn with_min_replicas(ctx: &Arc<ClusterContext>, min: u32, max: u32) {
        let mut config = ctx.config_snapshot();
        config.min_replicas = min;
        config.max_replicas = max;
        *ctx.config.write() = config;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use hafiz_core::types::{BlobOwnershipRecord, NodeRecord};
    use tempfile::tempdir;

    use super::test_support::{fixture, with_min_replicas};
    use super::*;

    async fn seed_node(ctx: &Arc<ClusterContext>, id: &str, heartbeat_age_secs: i64) {
        let mut record = NodeRecord::new(id.to_string(), "127.0.0.1".to_string(), format!("{id}:9000"));
        record.last_heartbeat = Utc::now() - chrono::Duration::seconds(heartbeat_age_secs);
        ctx.metadata
            .set(&NodeRecord::key(id), "node", serde_json::to_value(&record).unwrap())
            .await
            .unwrap();
    }

    async fn seed_blob(ctx: &Arc<ClusterContext>, hash: &str, owners: &[&str]) {
        let mut record = BlobOwnershipRecord::new(hash.to_string(), 10);
        for o in owners {
            record.add_owner(o.to_string());
        }
        ctx.metadata
            .set(&BlobOwnershipRecord::key(hash), "blob", serde_json::to_value(&record).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cleanup_node_strips_dead_owner_and_keeps_live_ones() {
        let dir = tempdir().unwrap();
        let ctx = fixture("n1", dir.path()).await;
        with_min_replicas(&ctx, 1, 5);

        seed_node(&ctx, "n1", 0).await;
        seed_node(&ctx, "dead", 10_000).await;
        seed_blob(&ctx, "aaaa", &["n1", "dead"]).await;

        cleanup_node(&ctx, &"dead".to_string(), 100).await.unwrap();

        let doc = ctx.metadata.get(&BlobOwnershipRecord::key("aaaa")).await.unwrap().unwrap();
        let record: BlobOwnershipRecord = serde_json::from_value(doc).unwrap();
        assert!(!record.owners.contains("dead"));
        assert!(record.owners.contains("n1"));
    }

    #[tokio::test]
    async fn cleanup_node_removes_node_record_once_no_blobs_remain() {
        let dir = tempdir().unwrap();
        let ctx = fixture("n1", dir.path()).await;
        with_min_replicas(&ctx, 1, 5);

        seed_node(&ctx, "dead", 10_000).await;

        cleanup_node(&ctx, &"dead".to_string(), 100).await.unwrap();

        assert!(ctx.metadata.get(&NodeRecord::key("dead")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sweep_skips_self_even_when_stale() {
        let dir = tempdir().unwrap();
        let ctx = fixture("n1", dir.path()).await;
        with_min_replicas(&ctx, 1, 5);

        seed_node(&ctx, "n1", 10_000).await;

        sweep(Arc::clone(&ctx)).await.unwrap();

        // Self-cleanup is never spawned; the record survives untouched.
        assert!(ctx.metadata.get(&NodeRecord::key("n1")).await.unwrap().is_some());
    }
}
