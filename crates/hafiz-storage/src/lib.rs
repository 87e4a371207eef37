//! Local content-addressed blob storage
//!
//! The cluster-coordination core treats the local blob store as an opaque
//! collaborator: store a stream, get back its hash and size; delete by
//! hash; ask how much free space remains. This crate is that collaborator.

pub mod engine;

pub use engine::{BlobStore, BlobWriter, LocalBlobStore};
