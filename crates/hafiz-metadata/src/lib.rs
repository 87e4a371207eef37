//! Metadata service for the Hafiz cluster-coordination core
//!
//! A flat, TTL-aware key/value space with a small family of secondary-index
//! views, backed by SQLite. See [`SqliteMetadataService`] for the durable
//! backend and [`InMemoryMetadataService`] for the test double.

pub mod error;
pub mod memory;
pub mod service;
pub mod sqlite;
pub mod views;

pub use error::{MetadataError, Result};
pub use memory::InMemoryMetadataService;
pub use service::{KvDocument, MetadataService};
pub use sqlite::SqliteMetadataService;
