//! Distributed task runner
//!
//! Ensures a named action runs at most once per period across the whole
//! cluster by leasing a [`JobMarker`] whose TTL equals the period — the
//! lease expiring *is* the signal that the next window has opened, so no
//! explicit release is needed.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use hafiz_core::types::JobMarker;
use hafiz_core::{TASK_JITTER_MAX_SECS, TASK_JITTER_MIN_SECS};
use rand::Rng;
use tracing::{debug, error, warn};

use crate::context::ClusterContext;
use crate::error::ClusterResult;

pub type PeriodFn = Box<dyn Fn() -> Duration + Send + Sync>;
pub type TaskAction = Box<dyn Fn() -> BoxFuture<'static, ClusterResult<()>> + Send + Sync>;

pub struct TaskRunner;

impl TaskRunner {
    /// Spawn `name`'s scheduling loop. Returns immediately; the loop runs
    /// until the process exits.
    pub fn spawn(ctx: Arc<ClusterContext>, name: impl Into<String>, period: PeriodFn, action: TaskAction) {
        let name = name.into();
        tokio::spawn(async move {
            let jitter = rand::rng().random_range(TASK_JITTER_MIN_SECS..=TASK_JITTER_MAX_SECS);
            tokio::time::sleep(Duration::from_secs(jitter)).await;

            loop {
                let t = period();
                if t < Duration::from_secs(1) {
                    warn!(task = %name, period = ?t, "period below 1s floor, skipping this round");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }

                let key = JobMarker::key(&name);
                let marker = JobMarker::new(ctx.node_id.clone());
                let value = match serde_json::to_value(&marker) {
                    Ok(v) => v,
                    Err(e) => {
                        error!(task = %name, error = %e, "failed to serialize job marker");
                        tokio::time::sleep(t + Duration::from_secs(1)).await;
                        continue;
                    }
                };

                match ctx.metadata.add(&key, "job", value, Some(t)).await {
                    Ok(()) => {
                        if let Err(e) = action().await {
                            error!(task = %name, error = %e, "task action failed");
                        }
                    }
                    Err(e) if matches!(e, hafiz_metadata::MetadataError::AlreadyExists(_)) => {
                        debug!(task = %name, "lease held by another node this round");
                    }
                    Err(e) => {
                        warn!(task = %name, error = %e, "failed to acquire lease");
                    }
                }

                tokio::time::sleep(t + Duration::from_secs(1)).await;
            }
        });
    }
}
