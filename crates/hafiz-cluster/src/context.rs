//! Shared state handed to every periodic task
//!
//! One `Arc`-wrapped struct every component (heartbeat, sweeps, the task
//! runner) closes over, instead of each owning its own copies of the
//! metadata service, blob store, and transport handles.

use std::sync::Arc;

use hafiz_core::types::NodeId;
use hafiz_core::ClusterCoreConfig;
use hafiz_storage::BlobStore;
use parking_lot::RwLock;

use hafiz_metadata::MetadataService;

use crate::transport::PeerTransport;

pub struct ClusterContext {
    pub node_id: NodeId,
    pub bind_addr: String,
    pub metadata_host: String,
    pub max_storage: u64,
    /// Concurrent fetch workers `bootstrap_pull` runs.
    pub verify_workers: usize,
    /// BootstrapPull: max blobs considered per pass.
    pub max_startup_objects: u32,
    /// BootstrapPull: upper bound (exclusive) of the under-replicated
    /// key-range scanned.
    pub max_startup_repls: u32,
    pub metadata: Arc<dyn MetadataService>,
    pub blob_store: Arc<dyn BlobStore>,
    pub transport: Arc<PeerTransport>,
    pub config: Arc<RwLock<ClusterCoreConfig>>,
}

impl ClusterContext {
    pub fn new(
        node_id: NodeId,
        bind_addr: String,
        metadata_host: String,
        max_storage: u64,
        verify_workers: usize,
        max_startup_objects: u32,
        max_startup_repls: u32,
        metadata: Arc<dyn MetadataService>,
        blob_store: Arc<dyn BlobStore>,
        transport: Arc<PeerTransport>,
    ) -> Arc<Self> {
        Arc::new(Self {
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
            config: Arc::new(RwLock::new(ClusterCoreConfig::default())),
        })
    }

    pub fn config_snapshot(&self) -> ClusterCoreConfig {
        self.config.read().clone()
    }
}
