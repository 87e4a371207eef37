//! Blob ownership records
//!
//! Maps a content hash to the set of nodes currently holding a replica.
//! Count of owners is, by definition, the observed replication factor for
//! that blob.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::node::NodeId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlobOwnershipRecord {
    /// Content hash identifying the blob.
    pub hash: String,
    /// Size in bytes, as observed by whichever node first stored it.
    pub size: u64,
    /// Nodes currently claiming a replica. A `BTreeSet` keeps serialized
    /// ownership records byte-stable across writes, which matters because
    /// the metadata service's `Set` is an unconditional overwrite.
    pub owners: BTreeSet<NodeId>,
}

impl BlobOwnershipRecord {
    pub fn new(hash: impl Into<String>, size: u64) -> Self {
        Self {
            hash: hash.into(),
            size,
            owners: BTreeSet::new(),
        }
    }

    /// The key this record is stored under: `/<blobHash>`.
    pub fn key(hash: &str) -> String {
        format!("/{hash}")
    }

    pub fn add_owner(&mut self, node_id: impl Into<NodeId>) {
        self.owners.insert(node_id.into());
    }

    pub fn remove_owner(&mut self, node_id: &str) {
        self.owners.remove(node_id);
    }

    pub fn replica_count(&self) -> usize {
        self.owners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owners_dedupe() {
        let mut rec = BlobOwnershipRecord::new("abc123", 42);
        rec.add_owner("n1");
        rec.add_owner("n1");
        rec.add_owner("n2");
        assert_eq!(rec.replica_count(), 2);
    }

    #[test]
    fn remove_owner_is_idempotent() {
        let mut rec = BlobOwnershipRecord::new("abc123", 42);
        rec.add_owner("n1");
        rec.remove_owner("n1");
        rec.remove_owner("n1");
        assert_eq!(rec.replica_count(), 0);
    }
}
