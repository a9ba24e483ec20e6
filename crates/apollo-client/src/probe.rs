//! Connectivity probe and outbound-IP discovery against the resolved service address.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tracing::{debug, warn};

use crate::address::ServiceAddress;
use crate::error::{ClientError, ClientResult};

/// Bound on the construction-time TCP dial.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Dial `address` over TCP once, failing if it does not connect within `timeout`.
///
/// # Errors
///
/// Returns [`ClientError::PortUnreachable`] naming the host and port.
pub async fn ensure_reachable(address: &ServiceAddress, timeout: Duration) -> ClientResult<()> {
    let unreachable = || ClientError::PortUnreachable {
        host: address.host.clone(),
        port: address.port,
    };
    match tokio::time::timeout(timeout, TcpStream::connect(address.address.as_str())).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(err)) => {
            debug!(address = %address.address, error = %err, "connectivity probe failed");
            Err(unreachable())
        }
        Err(_) => {
            debug!(address = %address.address, "connectivity probe timed out");
            Err(unreachable())
        }
    }
}

/// Local IP the server at `address` will see traffic from.
///
/// Connects a UDP socket to the target without sending anything and reads the bound
/// local address.
///
/// # Errors
///
/// Returns an IO error if the address does not resolve or no route exists.
pub async fn discover_outbound_ip(address: &str) -> io::Result<IpAddr> {
    let target = lookup_host(address).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses resolved for {address}"),
        )
    })?;
    let bind: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(target).await?;
    Ok(socket.local_addr()?.ip())
}

/// Per-address cache of discovered outbound IPs.
///
/// Each entry is written at most once; concurrent first callers may both discover, and
/// every caller observes whichever value was stored first. Failed discoveries are cached
/// as `None`. No lock is held while discovering.
#[derive(Debug, Default)]
pub struct OutboundIpCache {
    entries: Mutex<HashMap<String, Option<IpAddr>>>,
}

impl OutboundIpCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `address`, if one has been stored.
    #[must_use]
    pub fn cached(&self, address: &str) -> Option<Option<IpAddr>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .copied()
    }

    /// Outbound IP for `address`, discovering it on first use.
    pub async fn resolve(&self, address: &str) -> Option<IpAddr> {
        if let Some(cached) = self.cached(address) {
            return cached;
        }

        let discovered = match discover_outbound_ip(address).await {
            Ok(ip) => Some(ip),
            Err(err) => {
                warn!(address, error = %err, "outbound ip discovery failed; requests will omit ip");
                None
            }
        };

        *self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address.to_string())
            .or_insert(discovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address;
    use anyhow::Result;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn reachable_listener_passes_probe() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let target = address::resolve(&format!("http://127.0.0.1:{port}"))?;
        ensure_reachable(&target, DEFAULT_PROBE_TIMEOUT).await?;
        Ok(())
    }

    #[tokio::test]
    async fn closed_port_fails_probe_with_host_and_port() -> Result<()> {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await?;
            listener.local_addr()?.port()
        };
        let target = address::resolve(&format!("http://127.0.0.1:{port}"))?;
        let err = ensure_reachable(&target, DEFAULT_PROBE_TIMEOUT)
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("probe unexpectedly succeeded"))?;
        assert!(matches!(
            &err,
            ClientError::PortUnreachable { host, port: p } if host == "127.0.0.1" && *p == port
        ));
        assert_eq!(
            err.to_string(),
            format!("port {port} on 127.0.0.1 is closed or not reachable")
        );
        Ok(())
    }

    #[tokio::test]
    async fn loopback_target_discovers_loopback_ip() -> Result<()> {
        let ip = discover_outbound_ip("127.0.0.1:8080").await?;
        assert!(ip.is_loopback());
        Ok(())
    }

    #[tokio::test]
    async fn cache_keeps_first_value() {
        let cache = OutboundIpCache::new();
        assert_eq!(cache.cached("127.0.0.1:8080"), None);
        let first = cache.resolve("127.0.0.1:8080").await;
        let second = cache.resolve("127.0.0.1:8080").await;
        assert_eq!(first, second);
        assert_eq!(cache.cached("127.0.0.1:8080"), Some(first));
    }
}
