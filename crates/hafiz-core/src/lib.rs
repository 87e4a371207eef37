//! Hafiz Core Library
//!
//! Shared types, configuration, and utilities for the Hafiz
//! cluster-coordination core.

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use config::{ClusterCoreConfig, NodeConfig};
pub use error::{Error, Result};

/// Hafiz version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Task-runner startup jitter window, lower bound.
pub const TASK_JITTER_MIN_SECS: u64 = 5;

/// Task-runner startup jitter window, upper bound.
pub const TASK_JITTER_MAX_SECS: u64 = 65;
