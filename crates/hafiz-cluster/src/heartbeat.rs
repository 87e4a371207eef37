//! Heartbeat loop
//!
//! Publishes a fresh [`NodeRecord`] for this node on every tick. A full
//! overwrite, no compare-and-swap — the record only ever reflects this
//! node's own most recent view of itself.

use std::sync::Arc;

use hafiz_core::types::NodeRecord;
use hafiz_core::utils::{local_ip_via, log_non_fatal};
use parking_lot::RwLock;
use tokio::time::interval;
use tracing::warn;

use crate::context::ClusterContext;

/// Cached values used when a tick's I/O fails, so one bad tick doesn't
/// wipe out the node's last known address or capacity.
struct LastKnown {
    address: String,
    bytes_used: u64,
    bytes_free: u64,
}

pub struct Heartbeat;

impl Heartbeat {
    pub fn spawn(ctx: Arc<ClusterContext>) {
        tokio::spawn(async move {
            let last_known = RwLock::new(LastKnown {
                address: String::new(),
                bytes_used: 0,
                bytes_free: 0,
            });
            let mut ticker = interval(ctx.config_snapshot().heartbeat_freq());

            loop {
                ticker.tick().await;
                ticker = interval(ctx.config_snapshot().heartbeat_freq());
                Self::tick(&ctx, &last_known).await;
            }
        });
    }

    async fn tick(ctx: &ClusterContext, last_known: &RwLock<LastKnown>) {
        let address = match local_ip_via(&ctx.metadata_host).await {
            Ok(ip) => {
                last_known.write().address = ip.clone();
                ip
            }
            Err(e) => {
                warn!(error = %e, "failed to determine local IP, reusing last known");
                last_known.read().address.clone()
            }
        };

        let (bytes_used, bytes_free) = match ctx.blob_store.free_space().await {
            Ok((used, free)) => {
                let mut cache = last_known.write();
                cache.bytes_used = used;
                cache.bytes_free = free;
                (used, free)
            }
            Err(e) => {
                log_non_fatal("heartbeat: free space query", &e);
                let cache = last_known.read();
                (cache.bytes_used, cache.bytes_free)
            }
        };

        let mut record = NodeRecord::new(ctx.node_id.clone(), address, ctx.bind_addr.clone());
        record.bytes_used = bytes_used;
        record.bytes_free = bytes_free;

        let value = match serde_json::to_value(&record) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to serialize node record");
                return;
            }
        };

        if let Err(e) = ctx.metadata.set(&NodeRecord::key(&ctx.node_id), "node", value).await {
            warn!(error = %e, "heartbeat write failed, will retry next tick");
        }
    }
}
