//! Core types for the Hafiz cluster-coordination core

mod blob;
mod job;
mod node;
mod view;

pub use blob::BlobOwnershipRecord;
pub use job::JobMarker;
pub use node::{NodeId, NodeRecord};
pub use view::{FileBlobsTag, ViewName, ViewParams, ViewRow, ViewRowError, ViewResult};
