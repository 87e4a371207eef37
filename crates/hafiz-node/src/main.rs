//! hafiz-node - runs the cluster-coordination core for one node
//!
//! Loads configuration, constructs the storage and metadata backends, and
//! runs [`hafiz_cluster::ClusterCore`] forever. Deliberately thin: this is
//! the minimal process needed to exercise the core end to end, not a
//! replacement for the S3-facing server.

use std::sync::Arc;

use clap::Parser;
use hafiz_core::config::NodeConfig;
use hafiz_metadata::SqliteMetadataService;
use hafiz_storage::LocalBlobStore;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "hafiz-node")]
#[command(author = "Hafiz Team")]
#[command(version = hafiz_core::VERSION)]
#[command(about = "Cluster-coordination node for Hafiz", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// This node's stable identity
    #[arg(long, env = "HAFIZ_NODE_ID")]
    node_id: Option<String>,

    /// host:port this node's HTTP blob endpoint is reachable on
    #[arg(long, env = "HAFIZ_BIND_ADDR")]
    bind_addr: Option<String>,

    /// Directory holding locally stored blob data
    #[arg(long, env = "HAFIZ_DATA_DIR")]
    root: Option<String>,

    /// Storage ceiling in bytes; zero means no ceiling
    #[arg(long, env = "HAFIZ_MAX_STORAGE")]
    max_storage: Option<u64>,

    /// Connection string for the metadata service backend
    #[arg(long, env = "HAFIZ_DATABASE_URL")]
    metadata_url: Option<String>,

    /// BootstrapPull concurrency
    #[arg(long, env = "HAFIZ_VERIFY_WORKERS")]
    verify_workers: Option<usize>,

    /// BootstrapPull: max blobs considered per pass
    #[arg(long = "max-start-objs", env = "HAFIZ_MAX_START_OBJS")]
    max_start_objs: Option<u32>,

    /// BootstrapPull: upper bound (exclusive) of the under-replicated
    /// key-range scanned
    #[arg(long = "max-start-repls", env = "HAFIZ_MAX_START_REPLS")]
    max_start_repls: Option<u32>,

    /// Host the metadata service is reachable at, used to resolve this
    /// node's own advertised IP
    #[arg(long, env = "HAFIZ_METADATA_HOST", default_value = "localhost:80")]
    metadata_host: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "HAFIZ_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry().with(fmt::layer().with_target(true)).with(filter).init();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_file(path)?.merged_with(NodeConfig::from_env()),
        None => NodeConfig::from_env(),
    };

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(bind_addr) = cli.bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(root) = cli.root {
        config.data_dir = root.into();
    }
    if let Some(max_storage) = cli.max_storage {
        config.max_storage = max_storage;
    }
    if let Some(metadata_url) = cli.metadata_url {
        config.metadata_url = metadata_url;
    }
    if let Some(verify_workers) = cli.verify_workers {
        config.verify_workers = verify_workers;
    }
    if let Some(max_start_objs) = cli.max_start_objs {
        config.max_startup_objects = max_start_objs;
    }
    if let Some(max_start_repls) = cli.max_start_repls {
        config.max_startup_repls = max_start_repls;
    }

    if config.node_id.is_empty() {
        config.node_id = load_or_assign_node_id(&config.data_dir).await?;
    }

    info!(node_id = %config.node_id, bind_addr = %config.bind_addr, "starting hafiz-node");

    run(config, cli.metadata_host).await
}

/// A node's identity must survive restarts so its `NodeRecord` history and
/// ownership claims stay attached to the same id. Persisted as a plain
/// text file next to the blob store rather than in the metadata service,
/// since it must be readable before the metadata service connection is
/// known to work.
async fn load_or_assign_node_id(data_dir: &std::path::Path) -> anyhow::Result<String> {
    let marker = data_dir.join(".node_id");
    if let Ok(existing) = tokio::fs::read_to_string(&marker).await {
        let id = existing.trim().to_string();
        if !id.is_empty() {
            return Ok(id);
        }
    }

    tokio::fs::create_dir_all(data_dir).await?;
    let id = hafiz_core::utils::generate_request_id();
    tokio::fs::write(&marker, &id).await?;
    Ok(id)
}

async fn run(config: NodeConfig, metadata_host: String) -> anyhow::Result<()> {
    let blob_store = LocalBlobStore::new(&config.data_dir, config.max_storage);
    blob_store.init().await?;

    let metadata = SqliteMetadataService::new(&config.metadata_url).await?;

    let core = hafiz_cluster::ClusterCore::new(
        config.node_id,
        config.bind_addr,
        metadata_host,
        config.max_storage,
        config.verify_workers,
        config.max_startup_objects,
        config.max_startup_repls,
        Arc::new(metadata),
        Arc::new(blob_store),
    )?;

    core.start();

    // The core has no explicit shutdown path; it runs for the lifetime of
    // the process, matching every other binary in this workspace.
    std::future::pending::<()>().await;
    Ok(())
}
