//! Peer transport for fetching blob data from other nodes
//!
//! The core only ever consumes one peer HTTP surface — `GET
//! <bindAddr>/.cbfs/blob/<hash>` — so this is a thin retrying GET client,
//! not a general-purpose RPC layer.

use std::time::Duration;

use hafiz_core::types::NodeRecord;
use tracing::{debug, warn};

use crate::error::{ClusterError, ClusterResult};

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
        }
    }
}

pub struct PeerTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl PeerTransport {
    pub fn new(config: TransportConfig) -> ClusterResult<Self> {
        let client = reqwest::ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| ClusterError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Fetch a blob's raw bytes from a peer, retrying transient failures
    /// with exponential backoff.
    pub async fn fetch_blob(&self, peer: &NodeRecord, hash: &str) -> ClusterResult<bytes::Bytes> {
        let url = format!("http://{}/.cbfs/blob/{}", peer.bind_addr, hash);
        let mut delay = self.config.retry_base_delay;
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!(%url, attempt, "retrying blob fetch");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }

            match self.fetch_once(&url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    warn!(%url, attempt, error = %e, "blob fetch failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ClusterError::Transport("no attempts made".to_string())))
    }

    async fn fetch_once(&self, url: &str) -> ClusterResult<bytes::Bytes> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ClusterError::NodeUnreachable(format!("{url}: {}", response.status())));
        }
        Ok(response.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn transport_config_default_has_retries() {
        let config = TransportConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    /// Stands in for a peer's `.cbfs/blob/<hash>` endpoint. Fails the
    /// first `fail_first_n` requests with 503, then serves a fixed body.
    /// Returns the bound address and a shared call counter.
    async fn spawn_peer(fail_first_n: u32) -> (String, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let app = Router::new()
            .route(
                "/.cbfs/blob/{hash}",
                get(move |State(counter): State<Arc<AtomicU32>>| async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < fail_first_n {
                        StatusCode::SERVICE_UNAVAILABLE.into_response()
                    } else {
                        b"peer blob bytes".to_vec().into_response()
                    }
                }),
            )
            .with_state(Arc::clone(&calls));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr.to_string(), calls)
    }

    fn fast_retry_config() -> TransportConfig {
        TransportConfig {
            retry_base_delay: Duration::from_millis(1),
            ..TransportConfig::default()
        }
    }

    #[tokio::test]
    async fn fetch_blob_succeeds_against_a_running_peer() {
        let (bind_addr, _calls) = spawn_peer(0).await;
        let transport = PeerTransport::new(fast_retry_config()).unwrap();
        let peer = NodeRecord::new("peer".to_string(), "127.0.0.1".to_string(), bind_addr);

        let bytes = transport.fetch_blob(&peer, "deadbeef").await.unwrap();
        assert_eq!(&bytes[..], b"peer blob bytes");
    }

    #[tokio::test]
    async fn fetch_blob_retries_then_succeeds() {
        let (bind_addr, calls) = spawn_peer(2).await;
        let transport = PeerTransport::new(fast_retry_config()).unwrap();
        let peer = NodeRecord::new("peer".to_string(), "127.0.0.1".to_string(), bind_addr);

        let bytes = transport.fetch_blob(&peer, "deadbeef").await.unwrap();
        assert_eq!(&bytes[..], b"peer blob bytes");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fetch_blob_exhausts_retries_and_fails() {
        let (bind_addr, calls) = spawn_peer(u32::MAX).await;
        let config = TransportConfig {
            max_retries: 2,
            ..fast_retry_config()
        };
        let transport = PeerTransport::new(config).unwrap();
        let peer = NodeRecord::new("peer".to_string(), "127.0.0.1".to_string(), bind_addr);

        let result = transport.fetch_blob(&peer, "deadbeef").await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
