//! ClusterCore - the coordinator that wires up and starts every
//! background component this node runs
//!
//! Construct the shared handles once, wire dependent components against
//! them, then `start` spawns everything and returns immediately.

use std::sync::Arc;

use hafiz_metadata::MetadataService;
use hafiz_storage::BlobStore;
use tracing::info;

use crate::config_refresher::ConfigRefresher;
use crate::context::ClusterContext;
use crate::error::ClusterResult;
use crate::heartbeat::Heartbeat;
use crate::orphan_gc;
use crate::reconcile;
use crate::replica_repair;
use crate::stale_node_sweep;
use crate::task_runner::TaskRunner;
use crate::transport::{PeerTransport, TransportConfig};

pub struct ClusterCore {
    ctx: Arc<ClusterContext>,
}

impl ClusterCore {
    pub fn new(
        node_id: String,
        bind_addr: String,
        metadata_host: String,
        max_storage: u64,
        verify_workers: usize,
        max_startup_objects: u32,
        max_startup_repls: u32,
        metadata: Arc<dyn MetadataService>,
        blob_store: Arc<dyn BlobStore>,
    ) -> ClusterResult<Self> {
        let transport = Arc::new(PeerTransport::new(TransportConfig::default())?);
        let ctx = ClusterContext::new(
            node_id,
            bind_addr,
            metadata_host,
            max_storage,
            verify_workers,
            max_startup_objects,
            max_startup_repls,
            metadata,
            blob_store,
            transport,
        );
        Ok(Self { ctx })
    }

    /// Spawn every background loop this node runs. Returns immediately;
    /// the loops run for the lifetime of the process.
    pub fn start(&self) {
        info!(node_id = %self.ctx.node_id, "starting cluster core");

        Heartbeat::spawn(Arc::clone(&self.ctx));
        ConfigRefresher::spawn(Arc::clone(&self.ctx));

        let ctx = Arc::clone(&self.ctx);
        TaskRunner::spawn(
            Arc::clone(&self.ctx),
            "stale_node_sweep",
            Box::new(move || ctx.config_snapshot().stale_node_check_freq()),
            Box::new({
                let ctx = Arc::clone(&self.ctx);
                move || Box::pin(stale_node_sweep::sweep(Arc::clone(&ctx)))
            }),
        );

        let ctx = Arc::clone(&self.ctx);
        TaskRunner::spawn(
            Arc::clone(&self.ctx),
            "ensure_minimum_replica_count",
            Box::new(move || ctx.config_snapshot().under_replica_check_freq()),
            Box::new({
                let ctx = Arc::clone(&self.ctx);
                move || Box::pin(replica_repair::ensure_minimum_replica_count(Arc::clone(&ctx)))
            }),
        );

        let ctx = Arc::clone(&self.ctx);
        TaskRunner::spawn(
            Arc::clone(&self.ctx),
            "prune_excessive_replicas",
            Box::new(move || ctx.config_snapshot().over_replica_check_freq()),
            Box::new({
                let ctx = Arc::clone(&self.ctx);
                move || Box::pin(replica_repair::prune_excessive_replicas(Arc::clone(&ctx)))
            }),
        );

        let ctx = Arc::clone(&self.ctx);
        TaskRunner::spawn(
            Arc::clone(&self.ctx),
            "orphan_gc",
            Box::new(move || ctx.config_snapshot().gc_freq()),
            Box::new({
                let ctx = Arc::clone(&self.ctx);
                move || Box::pin(orphan_gc::collect(Arc::clone(&ctx)))
            }),
        );

        let ctx = Arc::clone(&self.ctx);
        TaskRunner::spawn(
            Arc::clone(&self.ctx),
            "reconcile",
            Box::new(move || ctx.config_snapshot().reconcile_freq()),
            Box::new({
                let ctx = Arc::clone(&self.ctx);
                move || Box::pin(reconcile::run(Arc::clone(&ctx)))
            }),
        );
    }

    pub fn context(&self) -> Arc<ClusterContext> {
        Arc::clone(&self.ctx)
    }
}
