//! Utility functions shared across the cluster-coordination core

use std::net::ToSocketAddrs;

use tokio::net::TcpStream;
use tracing::warn;

use crate::error::{Error, Result};

/// Generate a unique request/job identifier.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string().replace('-', "").to_uppercase()
}

/// Determine the local IP address by opening an outbound TCP connection to
/// `metadata_host` and reading the local side of the socket, then closing
/// it. This is how the heartbeat loop learns its own advertisable address
/// without requiring explicit network configuration.
pub async fn local_ip_via(metadata_host: &str) -> Result<String> {
    let addr = metadata_host
        .to_socket_addrs()
        .map_err(|e| Error::InternalError(format!("failed to resolve {metadata_host}: {e}")))?
        .next()
        .ok_or_else(|| Error::InternalError(format!("no addresses for {metadata_host}")))?;

    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| Error::InternalError(format!("failed to connect to {metadata_host}: {e}")))?;

    let local = stream
        .local_addr()
        .map_err(|e| Error::InternalError(format!("failed to read local addr: {e}")))?;

    drop(stream);
    Ok(local.ip().to_string())
}

/// Clamp a raw free-space reading to the configured storage ceiling.
/// `max_storage == 0` means "no ceiling".
pub fn clamp_free_space(raw_free: u64, bytes_used: u64, max_storage: u64) -> u64 {
    if max_storage == 0 {
        return raw_free;
    }
    let ceiling_free = max_storage.saturating_sub(bytes_used);
    raw_free.min(ceiling_free)
}

/// Log a non-fatal I/O error at `warn!`, suppressing the
/// [`Error::FreeSpaceUnsupported`] sentinel which is expected on some
/// filesystems and not worth alerting on.
pub fn log_non_fatal(context: &str, err: &Error) {
    if matches!(err, Error::FreeSpaceUnsupported) {
        return;
    }
    warn!(%context, error = %err, "non-fatal error, continuing");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_with_no_ceiling_passes_through() {
        assert_eq!(clamp_free_space(1000, 500, 0), 1000);
    }

    #[test]
    fn clamp_limits_to_remaining_ceiling() {
        assert_eq!(clamp_free_space(1000, 900, 1000), 100);
    }

    #[test]
    fn clamp_never_reports_negative_via_saturation() {
        assert_eq!(clamp_free_space(1000, 2000, 1000), 0);
    }
}
