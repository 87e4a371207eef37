//! Config refresher
//!
//! Polls the tunables document from the metadata service once a minute and
//! swaps it into the shared [`ClusterCoreConfig`]. Field changes take
//! effect at the next tick of whatever loop reads them; there is no
//! cross-loop synchronization beyond the shared `RwLock`.

use std::sync::Arc;
use std::time::Duration;

use hafiz_core::ClusterCoreConfig;
use tokio::time::interval;
use tracing::warn;

use crate::context::ClusterContext;

const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

pub struct ConfigRefresher;

impl ConfigRefresher {
    pub fn spawn(ctx: Arc<ClusterContext>) {
        tokio::spawn(async move {
            let mut ticker = interval(REFRESH_INTERVAL);
            loop {
                ticker.tick().await;
                Self::tick(&ctx).await;
            }
        });
    }

    async fn tick(ctx: &ClusterContext) {
        match ctx.metadata.get(ClusterCoreConfig::KEY).await {
            Ok(Some(value)) => match serde_json::from_value::<ClusterCoreConfig>(value) {
                Ok(fresh) => *ctx.config.write() = fresh,
                Err(e) => warn!(error = %e, "malformed tunables document, keeping previous config"),
            },
            Ok(None) => {
                // No document published yet; keep running on defaults.
            }
            Err(e) => warn!(error = %e, "failed to fetch tunables, keeping previous config"),
        }
    }
}
