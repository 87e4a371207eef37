//! Distributed lease records used by the periodic task runner

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// A short-lived lease granting its creator the right to run a named
/// periodic task until the lease's TTL expires.
///
/// Created via the metadata service's atomic-set-if-absent primitive.
/// Never explicitly deleted: it expires on its own, which is what lets the
/// next eligible run start without any release step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMarker {
    pub owner: NodeId,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl JobMarker {
    pub fn new(owner: NodeId) -> Self {
        Self {
            owner,
            started_at: Utc::now(),
            kind: "job".to_string(),
        }
    }

    /// The key this lease is stored under: `/@<jobName>`.
    pub fn key(job_name: &str) -> String {
        format!("/@{job_name}")
    }
}
