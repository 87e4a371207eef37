//! Hafiz Cluster - cluster-coordination core
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ClusterCore                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌────────────┐  ┌────────────────┐  ┌────────────────────┐ │
//! │  │ Heartbeat  │  │ ConfigRefresher│  │    TaskRunner x5   │ │
//! │  │            │  │                │  │                    │ │
//! │  │ publishes  │  │ polls tunables │  │ stale_node_sweep    │ │
//! │  │ NodeRecord │  │ every minute   │  │ ensure_min_replicas │ │
//! │  │ every tick │  │                │  │ prune_excess_repls  │ │
//! │  │            │  │                │  │ orphan_gc           │ │
//! │  │            │  │                │  │ reconcile           │ │
//! │  └──────┬─────┘  └────────┬───────┘  └──────────┬──────────┘ │
//! │         │                 │                     │            │
//! │         └─────────────────┼─────────────────────┘            │
//! │                           │                                  │
//! │                  ┌────────┴────────┐                         │
//! │                  │  ClusterContext │                         │
//! │                  │ metadata / blob │                         │
//! │                  │ store / peer    │                         │
//! │                  │ transport       │                         │
//! │                  └─────────────────┘                         │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Features
//!
//! - **Distributed leasing**: every periodic task runs cluster-wide at
//!   most once per period via a TTL'd `JobMarker` lease
//! - **Stale-node sweeping**: dead nodes are detected by heartbeat age and
//!   their ownership claims unwound
//! - **Replica repair**: under- and over-replicated blobs are continuously
//!   corrected against configured bounds
//! - **Orphan collection**: ownership claims with no surviving file
//!   reference are reclaimed
//! - **Reconciliation**: local disk contents and bootstrap replication are
//!   kept in agreement with the metadata service

mod config_refresher;
mod context;
mod core;
mod error;
mod heartbeat;
mod orphan_gc;
mod reconcile;
mod replica_repair;
mod stale_node_sweep;
mod task_runner;
mod transport;

pub use config_refresher::ConfigRefresher;
pub use context::ClusterContext;
pub use core::ClusterCore;
pub use error::{ClusterError, ClusterResult};
pub use heartbeat::Heartbeat;
pub use task_runner::TaskRunner;
pub use transport::{PeerTransport, TransportConfig};
