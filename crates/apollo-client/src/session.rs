//! Long-lived client session: validated settings, resolved address, and shared transport.
//!
//! # Design
//! - Construction validates inputs and probes the server once; a returned session is
//!   always usable and its settings never change.
//! - The transport and outbound-IP cache sit behind `Arc`s so several sessions can share
//!   pools and discoveries.
//! - Every call is a single round trip bounded by the configured timeout.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::address::{self, ServiceAddress};
use crate::config::SessionConfig;
use crate::configs::ConfigQuery;
use crate::error::{ClientError, ClientResult};
use crate::probe::{self, OutboundIpCache};
use crate::transport::{HttpTransport, RequestOutcome, Transport, TransportRequest};

/// Connection to one application's configuration on one config service.
#[derive(Clone)]
pub struct ClientSession {
    config: SessionConfig,
    address: ServiceAddress,
    transport: Arc<dyn Transport>,
    ip_cache: Arc<OutboundIpCache>,
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("base_url", &self.config.base_url)
            .field("app_id", &self.config.app_id)
            .field("cluster", &self.config.cluster)
            .field("signed", &self.is_signed())
            .field("address", &self.address.address)
            .finish_non_exhaustive()
    }
}

impl ClientSession {
    /// Validate `config`, probe the server, and build a session over reqwest.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EmptyUrl`] or [`ClientError::EmptyAppId`] for missing
    /// inputs, address errors for a malformed URL, and [`ClientError::PortUnreachable`]
    /// when the probe fails.
    pub async fn connect(config: SessionConfig) -> ClientResult<Self> {
        Self::connect_with_transport(config, Arc::new(HttpTransport::new())).await
    }

    /// Same as [`ClientSession::connect`] but issuing requests through `transport`.
    ///
    /// # Errors
    ///
    /// See [`ClientSession::connect`].
    pub async fn connect_with_transport(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
    ) -> ClientResult<Self> {
        if config.base_url.is_empty() {
            return Err(ClientError::EmptyUrl);
        }
        if config.app_id.is_empty() {
            return Err(ClientError::EmptyAppId);
        }

        let address = address::resolve(&config.base_url)?;
        probe::ensure_reachable(&address, config.probe_timeout).await?;
        info!(
            address = %address.address,
            app_id = %config.app_id,
            cluster = %config.cluster,
            signed = config.secret.as_deref().is_some_and(|secret| !secret.is_empty()),
            tls = ?config.tls_policy,
            "config session established"
        );

        Ok(Self {
            config,
            address,
            transport,
            ip_cache: Arc::new(OutboundIpCache::new()),
        })
    }

    /// Share `cache` with other sessions instead of this session's own.
    #[must_use]
    pub fn with_ip_cache(mut self, cache: Arc<OutboundIpCache>) -> Self {
        self.ip_cache = cache;
        self
    }

    /// Settings the session was built with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Address resolved from the base URL at construction.
    #[must_use]
    pub const fn address(&self) -> &ServiceAddress {
        &self.address
    }

    /// Whether requests carry authentication headers.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.config
            .secret
            .as_deref()
            .is_some_and(|secret| !secret.is_empty())
    }

    /// Start a retrieval of `namespace`; defaults to the non-cached endpoint.
    pub fn configs(&self, namespace: impl Into<String>) -> ConfigQuery<'_> {
        ConfigQuery::new(self, namespace.into())
    }

    /// IP to report on retrieval requests, if any.
    pub(crate) async fn client_ip(&self) -> Option<IpAddr> {
        if !self.config.report_client_ip {
            return None;
        }
        if let Some(ip) = self.config.client_ip {
            return Some(ip);
        }
        self.ip_cache.resolve(&self.address.address).await
    }

    /// Issue one signed (when configured) GET bounded by `timeout`.
    pub(crate) async fn send(&self, url: &str, timeout: Duration) -> ClientResult<RequestOutcome> {
        let request = TransportRequest {
            url: url.to_string(),
            app_id: self.config.app_id.clone(),
            secret: self.config.secret.clone(),
            timeout,
            tls: self.config.tls_policy,
        };
        self.transport.get(&request).await
    }
}
