//! Reconcile and BootstrapPull
//!
//! `reconcile` makes this node's ownership records agree with what it
//! actually has on disk. `bootstrap_pull` goes the other way: it looks at
//! blobs this node is *supposed* to own (because they're under-replicated
//! cluster-wide) and pulls their bytes in, through a small bounded pool of
//! concurrent fetch workers. Both run back to back on `ReconcileFreq`.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use hafiz_core::types::{BlobOwnershipRecord, NodeRecord, ViewParams};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::context::ClusterContext;
use crate::error::{ClusterError, ClusterResult};

pub async fn run(ctx: Arc<ClusterContext>) -> ClusterResult<()> {
    let freq = ctx.config_snapshot().reconcile_freq();
    if freq.is_zero() {
        return Ok(());
    }

    reconcile(&ctx).await?;
    bootstrap_pull(&ctx).await?;
    Ok(())
}

/// Make this node's ownership claims agree with what's actually on disk.
/// Missing claims are added; extra claims (a record says we own something
/// we don't have) are logged but never deleted, since the record may
/// simply be about to be repaired by a fetch already in flight.
async fn reconcile(ctx: &Arc<ClusterContext>) -> ClusterResult<()> {
    let local: HashSet<String> = ctx.blob_store.list_local_blobs().await?.into_iter().collect();

    let mut params = ViewParams::non_stale();
    params.key = Some(serde_json::json!(ctx.node_id));
    let result = ctx.metadata.view("cluster", "node_blobs", &params).await?;
    if result.has_errors() {
        let reason = result.errors.first().map(|e| e.reason.clone()).unwrap_or_default();
        return Err(ClusterError::ViewError { design: "node_blobs".to_string(), reason });
    }

    let claimed: HashSet<String> =
        result.rows.iter().filter_map(|r| r.value.as_str().map(str::to_string)).collect();

    for hash in local.difference(&claimed) {
        let key = BlobOwnershipRecord::key(hash);
        let mut record = match ctx.metadata.get(&key).await? {
            Some(doc) => serde_json::from_value(doc)?,
            None => {
                let size = ctx.blob_store.blob_size(hash).await.unwrap_or(0);
                BlobOwnershipRecord::new(hash.clone(), size)
            }
        };
        record.add_owner(ctx.node_id.clone());
        ctx.metadata.set(&key, "blob", serde_json::to_value(&record)?).await?;
        info!(%hash, "reconcile: recorded missing ownership claim");
    }

    for hash in claimed.difference(&local) {
        warn!(%hash, "reconcile: ownership record claims a blob not present on disk");
    }

    Ok(())
}

/// Pull in replicas of blobs this node should help carry: everything
/// under-replicated cluster-wide, up to `MaxStartupObjects` at a time.
async fn bootstrap_pull(ctx: &Arc<ClusterContext>) -> ClusterResult<()> {
    let result = ctx
        .metadata
        .view(
            "cluster",
            "repcounts",
            &ViewParams::non_stale()
                .include_docs()
                .with_limit(ctx.max_startup_objects)
                .key_range(serde_json::json!(1), serde_json::json!(ctx.max_startup_repls.saturating_sub(1))),
        )
        .await?;
    if result.has_errors() {
        let reason = result.errors.first().map(|e| e.reason.clone()).unwrap_or_default();
        return Err(ClusterError::ViewError { design: "repcounts".to_string(), reason });
    }

    let nodes_result = ctx.metadata.view("cluster", "nodes", &ViewParams::non_stale().include_docs()).await?;
    let mut peers = std::collections::HashMap::new();
    for row in nodes_result.rows {
        if let Some(doc) = row.doc {
            if let Ok(node) = serde_json::from_value::<NodeRecord>(doc.clone()) {
                peers.insert(node.node_id.clone(), node);
            }
        }
    }

    let mut work = Vec::new();
    for row in result.rows {
        let Some(doc) = row.doc else { continue };
        let Ok(record) = serde_json::from_value::<BlobOwnershipRecord>(doc) else { continue };
        if record.owners.contains(&ctx.node_id) {
            continue;
        }
        let Some(source) = record.owners.iter().find_map(|id| peers.get(id).cloned()) else {
            continue;
        };
        work.push((record.hash.clone(), source));
    }

    let semaphore = Arc::new(Semaphore::new(ctx.verify_workers.max(1)));
    let mut tasks = FuturesUnordered::new();
    for (hash, source) in work {
        let ctx = Arc::clone(ctx);
        let semaphore = Arc::clone(&semaphore);
        tasks.push(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            data_init_fetch_one(&ctx, &hash, &source).await
        });
    }

    while let Some(outcome) = tasks.next().await {
        if let Err(e) = outcome {
            warn!(error = %e, "bootstrap pull of one blob failed");
        }
    }

    Ok(())
}

/// Fetch one blob's bytes from `source` and claim ownership. The hash
/// requested from the peer is trusted as an identifier, not re-verified
/// against the content: the store hashes what it actually receives, and
/// if that differs from what was asked for, the blob is still kept under
/// its real hash rather than discarded — the next `repcounts` pass will
/// notice the original hash is still under-replicated and try again.
async fn data_init_fetch_one(ctx: &Arc<ClusterContext>, requested_hash: &str, source: &NodeRecord) -> ClusterResult<()> {
    let bytes = ctx.transport.fetch_blob(source, requested_hash).await?;
    let (actual_hash, size) = ctx.blob_store.store_blob(bytes).await?;

    if actual_hash != requested_hash {
        warn!(requested_hash, %actual_hash, "peer served content not matching the requested hash");
    }

    let key = BlobOwnershipRecord::key(&actual_hash);
    let mut record = match ctx.metadata.get(&key).await? {
        Some(doc) => serde_json::from_value(doc)?,
        None => BlobOwnershipRecord::new(actual_hash.clone(), size),
    };
    record.add_owner(ctx.node_id.clone());
    ctx.metadata.set(&key, "blob", serde_json::to_value(&record)?).await?;

    info!(hash = %actual_hash, node_id = %source.node_id, "bootstrap pull complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use hafiz_storage::BlobStore;
    use tempfile::tempdir;

    use super::*;
    use crate::stale_node_sweep::test_support::fixture;

    #[tokio::test]
    async fn reconcile_records_ownership_for_blobs_present_on_disk() {
        let dir = tempdir().unwrap();
        let ctx = fixture("n1", dir.path()).await;

        let (hash, _) = ctx.blob_store.store_blob(Bytes::from_static(b"local only")).await.unwrap();

        reconcile(&ctx).await.unwrap();

        let doc = ctx.metadata.get(&BlobOwnershipRecord::key(&hash)).await.unwrap().unwrap();
        let record: BlobOwnershipRecord = serde_json::from_value(doc).unwrap();
        assert!(record.owners.contains("n1"));
    }

    #[tokio::test]
    async fn reconcile_never_deletes_claims_for_missing_blobs() {
        let dir = tempdir().unwrap();
        let ctx = fixture("n1", dir.path()).await;

        let mut record = BlobOwnershipRecord::new("ghost".to_string(), 5);
        record.add_owner("n1".to_string());
        ctx.metadata.set(&BlobOwnershipRecord::key("ghost"), "blob", serde_json::to_value(&record).unwrap()).await.unwrap();

        reconcile(&ctx).await.unwrap();

        assert!(ctx.metadata.get(&BlobOwnershipRecord::key("ghost")).await.unwrap().is_some());
    }
}
