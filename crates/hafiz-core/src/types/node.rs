//! Node liveness and capacity records
//!
//! A `NodeRecord` is published by its owning node on every heartbeat tick
//! and read by every other node through the metadata service's `node_blobs`
//! and plain-get paths. It is a full overwrite, never a compare-and-swap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable node identity, assigned at first boot and persisted locally.
pub type NodeId = String;

/// Liveness and capacity advertisement for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Stable node identity.
    pub node_id: NodeId,
    /// Local IP as observed by opening an outbound connection to the
    /// metadata service host.
    pub address: String,
    /// host:port of this node's HTTP blob endpoint.
    pub bind_addr: String,
    /// UTC timestamp of the most recent successful heartbeat.
    pub last_heartbeat: DateTime<Utc>,
    /// Bytes currently occupied by local blob storage.
    pub bytes_used: u64,
    /// Bytes free, clamped by the configured storage ceiling.
    pub bytes_free: u64,
    /// Discriminator used when a view aggregates multiple document kinds.
    #[serde(rename = "type")]
    pub kind: String,
}

impl NodeRecord {
    pub fn new(node_id: NodeId, address: String, bind_addr: String) -> Self {
        Self {
            node_id,
            address,
            bind_addr,
            last_heartbeat: Utc::now(),
            bytes_used: 0,
            bytes_free: 0,
            kind: "node".to_string(),
        }
    }

    /// The key this record is stored under: `/<nodeId>`.
    pub fn key(node_id: &str) -> String {
        format!("/{node_id}")
    }

    /// The key of this node's replica counter side-record: `/<nodeId>/r`.
    pub fn replica_counter_key(node_id: &str) -> String {
        format!("/{node_id}/r")
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_node_limit: chrono::Duration) -> bool {
        now - self.last_heartbeat > stale_node_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_has_leading_slash() {
        assert_eq!(NodeRecord::key("node-1"), "/node-1");
        assert_eq!(NodeRecord::replica_counter_key("node-1"), "/node-1/r");
    }

    #[test]
    fn staleness_compares_against_limit() {
        let mut record = NodeRecord::new("n1".into(), "10.0.0.1".into(), "10.0.0.1:9000".into());
        record.last_heartbeat = Utc::now() - chrono::Duration::seconds(120);
        assert!(record.is_stale(Utc::now(), chrono::Duration::seconds(60)));
        assert!(!record.is_stale(Utc::now(), chrono::Duration::seconds(300)));
    }
}
