//! ReplicaRepair and ReplicaPrune
//!
//! `ensure_minimum_replica_count` and `prune_excessive_replicas` both read
//! the `repcounts` view and both reuse the candidate-selection helper
//! StaleNodeSweep's `salvageBlob` uses, so it lives here as
//! [`pick_salvage_target`] rather than being duplicated.
//!
//! Pruning enqueues a delete on each victim the same way OrphanGC does:
//! no push RPC exists to make a peer delete its own copy, so a victim's
//! local file is only deleted here when the victim is this node itself
//! (see [`enqueue_delete`]); a peer victim's dangling file is left for
//! that peer's own future gc/reconcile pass to find.

use std::collections::BTreeSet;
use std::sync::Arc;

use hafiz_core::types::{BlobOwnershipRecord, NodeId, ViewParams};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::context::ClusterContext;
use crate::error::{ClusterError, ClusterResult};

/// Find a live node that could take on a replica of a blob: not already an
/// owner, and not the node being cleaned up (if any).
pub async fn pick_salvage_target(
    ctx: &ClusterContext,
    owners: &BTreeSet<NodeId>,
    exclude: Option<&str>,
) -> ClusterResult<NodeId> {
    let result = ctx.metadata.view("cluster", "nodes", &ViewParams::non_stale()).await?;
    if result.has_errors() {
        let reason = result.errors.first().map(|e| e.reason.clone()).unwrap_or_default();
        return Err(ClusterError::ViewError { design: "nodes".to_string(), reason });
    }

    result
        .rows
        .into_iter()
        .map(|row| hafiz_core::types::ViewResult::strip_id_prefix(&row.id).to_string())
        .find(|id| !owners.contains(id) && exclude != Some(id.as_str()))
        .ok_or_else(|| ClusterError::NoSalvageCandidate("no eligible peer found".to_string()))
}

/// Act on a salvage decision. There is no push RPC to command a remote
/// node to fetch a blob, so: if this node is the chosen candidate, it
/// pulls the blob itself right now and claims ownership; otherwise the
/// chosen node's own `ensure_minimum_replica_count` pass will notice the
/// same deficit on its next run (every node scans `repcounts`
/// independently) and fix it then.
pub async fn salvage_blob(ctx: &Arc<ClusterContext>, hash: &str, owners: &BTreeSet<NodeId>, candidate: &NodeId) {
    if candidate != &ctx.node_id {
        debug!(%hash, %candidate, "salvage candidate is a peer, deferring to its own repair pass");
        return;
    }

    let Some(source_id) = owners.iter().next().cloned() else {
        warn!(%hash, "salvage target has no source owner to fetch from");
        return;
    };

    if let Err(e) = fetch_and_claim(ctx, &source_id, hash).await {
        warn!(%hash, %source_id, error = %e, "self-salvage fetch failed");
    }
}

async fn fetch_and_claim(ctx: &Arc<ClusterContext>, source_id: &str, expected_hash: &str) -> ClusterResult<()> {
    let Some(source_doc) = ctx.metadata.get(&hafiz_core::types::NodeRecord::key(source_id)).await? else {
        return Err(ClusterError::NodeNotFound(source_id.to_string()));
    };
    let source: hafiz_core::types::NodeRecord = serde_json::from_value(source_doc)?;

    let bytes = ctx.transport.fetch_blob(&source, expected_hash).await?;
    let (actual_hash, len) = ctx.blob_store.store_blob(bytes).await?;

    claim_ownership(ctx, &actual_hash, len).await
}

/// Enqueue a delete of one excess replica. There is no push RPC to command
/// a peer to delete a blob, so: if this node is the victim it deletes its
/// own copy right now; otherwise the victim's own future GC/reconcile pass
/// is left to notice its ownership record is gone and the local file is
/// now dangling (same resolution as `orphan_gc::delete_on_owner`).
async fn enqueue_delete(ctx: &Arc<ClusterContext>, victim: &NodeId, hash: &str) {
    if victim != &ctx.node_id {
        debug!(%hash, %victim, "prune victim is a peer, deferring to its own gc pass");
        return;
    }
    if let Err(e) = ctx.blob_store.delete_blob(hash).await {
        warn!(%hash, error = %e, "failed to delete pruned local blob");
    }
}

async fn claim_ownership(ctx: &Arc<ClusterContext>, hash: &str, size: u64) -> ClusterResult<()> {
    let key = BlobOwnershipRecord::key(hash);
    let record = match ctx.metadata.get(&key).await? {
        Some(doc) => {
            let mut record: BlobOwnershipRecord = serde_json::from_value(doc)?;
            record.add_owner(ctx.node_id.clone());
            record
        }
        None => {
            let mut record = BlobOwnershipRecord::new(hash.to_string(), size);
            record.add_owner(ctx.node_id.clone());
            record
        }
    };
    ctx.metadata.set(&key, "blob", serde_json::to_value(&record)?).await?;
    Ok(())
}

/// `UnderReplicaCheckFreq`: top up blobs below `MinReplicas`.
pub async fn ensure_minimum_replica_count(ctx: Arc<ClusterContext>) -> ClusterResult<()> {
    let min_replicas = ctx.config_snapshot().min_replicas as u64;

    let result = ctx
        .metadata
        .view(
            "cluster",
            "repcounts",
            &ViewParams::non_stale().reduce().key_range(json!(0), json!(min_replicas.saturating_sub(1))),
        )
        .await?;
    if result.has_errors() {
        let reason = result.errors.first().map(|e| e.reason.clone()).unwrap_or_default();
        return Err(ClusterError::ViewError { design: "repcounts".to_string(), reason });
    }

    for row in result.rows {
        let hash = hafiz_core::types::ViewResult::strip_id_prefix(&row.id).to_string();
        let Some(doc) = ctx.metadata.get(&BlobOwnershipRecord::key(&hash)).await? else {
            continue;
        };
        let record: BlobOwnershipRecord = serde_json::from_value(doc)?;

        // Re-check under the lock of a fresh read: another task may have
        // already fixed this since the view was evaluated.
        if record.replica_count() as u64 >= min_replicas {
            continue;
        }

        match pick_salvage_target(&ctx, &record.owners, None).await {
            Ok(candidate) => salvage_blob(&ctx, &hash, &record.owners, &candidate).await,
            Err(e) => warn!(%hash, error = %e, "no replica-repair candidate available"),
        }
    }

    Ok(())
}

/// `OverReplicaCheckFreq`: drop excess replicas of over-replicated blobs,
/// preferring to drop from owners with the least free capacity.
pub async fn prune_excessive_replicas(ctx: Arc<ClusterContext>) -> ClusterResult<()> {
    let max_replicas = ctx.config_snapshot().max_replicas as u64;

    let result = ctx
        .metadata
        .view(
            "cluster",
            "repcounts",
            &ViewParams::non_stale().reduce().key_range(json!(max_replicas + 1), json!(u64::MAX)),
        )
        .await?;
    if result.has_errors() {
        let reason = result.errors.first().map(|e| e.reason.clone()).unwrap_or_default();
        return Err(ClusterError::ViewError { design: "repcounts".to_string(), reason });
    }

    let nodes_result = ctx.metadata.view("cluster", "nodes", &ViewParams::non_stale().include_docs()).await?;
    let mut free_by_node: std::collections::HashMap<NodeId, u64> = std::collections::HashMap::new();
    for row in nodes_result.rows {
        if let Some(doc) = row.doc {
            if let Ok(node) = serde_json::from_value::<hafiz_core::types::NodeRecord>(doc) {
                free_by_node.insert(node.node_id, node.bytes_free);
            }
        }
    }

    for row in result.rows {
        let hash = hafiz_core::types::ViewResult::strip_id_prefix(&row.id).to_string();
        let Some(doc) = ctx.metadata.get(&BlobOwnershipRecord::key(&hash)).await? else {
            continue;
        };
        let mut record: BlobOwnershipRecord = serde_json::from_value(doc)?;

        let excess = (record.replica_count() as u64).saturating_sub(max_replicas);
        if excess == 0 {
            continue;
        }

        let mut owners: Vec<NodeId> = record.owners.iter().cloned().collect();
        owners.sort_by_key(|id| free_by_node.get(id).copied().unwrap_or(u64::MAX));

        for victim in owners.into_iter().take(excess as usize) {
            enqueue_delete(&ctx, &victim, &hash).await;
            record.remove_owner(&victim);
            info!(%hash, node = %victim, "pruning excess replica");
        }
        ctx.metadata.set(&BlobOwnershipRecord::key(&hash), "blob", serde_json::to_value(&record)?).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use hafiz_core::types::NodeRecord;
    use hafiz_storage::BlobStore;
    use tempfile::tempdir;

    use super::*;
    use crate::stale_node_sweep::test_support::{fixture, with_min_replicas};

    async fn seed_node(ctx: &Arc<ClusterContext>, id: &str, bytes_free: u64) {
        let mut record = NodeRecord::new(id.to_string(), "127.0.0.1".to_string(), format!("{id}:9000"));
        record.bytes_free = bytes_free;
        ctx.metadata.set(&NodeRecord::key(id), "node", serde_json::to_value(&record).unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn prune_drops_owners_with_least_free_space_first() {
        let dir = tempdir().unwrap();
        let ctx = fixture("n1", dir.path()).await;
        with_min_replicas(&ctx, 1, 2);

        seed_node(&ctx, "n1", 100).await;
        seed_node(&ctx, "n2", 10).await;
        seed_node(&ctx, "n3", 1000).await;

        let mut record = BlobOwnershipRecord::new("aaaa".to_string(), 5);
        record.add_owner("n1".to_string());
        record.add_owner("n2".to_string());
        record.add_owner("n3".to_string());
        ctx.metadata.set(&BlobOwnershipRecord::key("aaaa"), "blob", serde_json::to_value(&record).unwrap()).await.unwrap();

        prune_excessive_replicas(Arc::clone(&ctx)).await.unwrap();

        let doc = ctx.metadata.get(&BlobOwnershipRecord::key("aaaa")).await.unwrap().unwrap();
        let pruned: BlobOwnershipRecord = serde_json::from_value(doc).unwrap();
        assert_eq!(pruned.replica_count(), 2);
        assert!(!pruned.owners.contains("n2"));
    }

    #[tokio::test]
    async fn prune_deletes_the_local_file_when_self_is_the_victim() {
        let dir = tempdir().unwrap();
        let ctx = fixture("n1", dir.path()).await;
        with_min_replicas(&ctx, 1, 2);

        // n1 (self) has the least free space, so it should be the one
        // pruned first.
        seed_node(&ctx, "n1", 10).await;
        seed_node(&ctx, "n2", 100).await;
        seed_node(&ctx, "n3", 1000).await;

        let (hash, _) = ctx.blob_store.store_blob(Bytes::from_static(b"excess replica")).await.unwrap();
        let mut record = BlobOwnershipRecord::new(hash.clone(), 15);
        record.add_owner("n1".to_string());
        record.add_owner("n2".to_string());
        record.add_owner("n3".to_string());
        ctx.metadata.set(&BlobOwnershipRecord::key(&hash), "blob", serde_json::to_value(&record).unwrap()).await.unwrap();

        prune_excessive_replicas(Arc::clone(&ctx)).await.unwrap();

        let doc = ctx.metadata.get(&BlobOwnershipRecord::key(&hash)).await.unwrap().unwrap();
        let pruned: BlobOwnershipRecord = serde_json::from_value(doc).unwrap();
        assert!(!pruned.owners.contains("n1"));
        assert!(!ctx.blob_store.exists(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn pick_salvage_target_excludes_owners_and_dead_node() {
        let dir = tempdir().unwrap();
        let ctx = fixture("n1", dir.path()).await;

        seed_node(&ctx, "n1", 100).await;
        seed_node(&ctx, "n2", 100).await;
        seed_node(&ctx, "dead", 100).await;

        let owners: BTreeSet<NodeId> = ["n1"].into_iter().map(String::from).collect();
        let candidate = pick_salvage_target(&ctx, &owners, Some("dead")).await.unwrap();
        assert_eq!(candidate, "n2");
    }
}
