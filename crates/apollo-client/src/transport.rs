//! Signed HTTP GET transport with policy-keyed connection pools.
//!
//! # Design
//! - Two pools, one per TLS verification policy, each built lazily and at most once.
//! - Status codes are returned uninterpreted; retrieval and watch decide what succeeds.
//! - No retries at this layer.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::signer;

/// Idle connections kept per host in each pool.
pub const MAX_IDLE_CONNS_PER_HOST: usize = 512;
/// Bound on establishing a TCP connection.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(1);
/// TCP keep-alive interval for pooled connections.
pub const DIAL_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// TLS certificate verification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsPolicy {
    /// Verify server certificates against the trust store.
    #[default]
    Verify,
    /// Accept any server certificate.
    SkipVerify,
}

/// A single GET to be issued by a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Fully-built request URL.
    pub url: String,
    /// Application identity used in the `Authorization` header.
    pub app_id: String,
    /// Access key secret; `None` or empty sends the request unsigned.
    pub secret: Option<String>,
    /// Deadline for connect, headers, and body read together.
    pub timeout: Duration,
    /// Which connection pool to use.
    pub tls: TlsPolicy,
}

/// Raw result of a transport call.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    /// URL the request was sent to.
    pub request_url: String,
    /// Headers attached to the request.
    pub request_headers: HeaderMap,
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub response_headers: HeaderMap,
    /// Fully buffered response body.
    pub body: Vec<u8>,
}

impl RequestOutcome {
    /// Server returned data (200).
    #[must_use]
    pub fn is_data_returned(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Server reported the data unchanged (304).
    #[must_use]
    pub fn is_data_unchanged(&self) -> bool {
        self.status == StatusCode::NOT_MODIFIED
    }

    /// Body as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Abstraction over the HTTP GET round trip.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue `request` and return the buffered outcome.
    async fn get(&self, request: &TransportRequest) -> ClientResult<RequestOutcome>;
}

/// Lazily-built reqwest clients, one per [`TlsPolicy`].
#[derive(Debug, Default)]
pub struct ConnectionPools {
    verified: OnceCell<Client>,
    unverified: OnceCell<Client>,
}

impl ConnectionPools {
    /// Create an empty pool set; clients are built on first use.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            verified: OnceCell::new(),
            unverified: OnceCell::new(),
        }
    }

    /// Client for `policy`, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ClientBuild`] if reqwest cannot construct the client.
    pub fn client(&self, policy: TlsPolicy) -> ClientResult<&Client> {
        let cell = match policy {
            TlsPolicy::Verify => &self.verified,
            TlsPolicy::SkipVerify => &self.unverified,
        };
        cell.get_or_try_init(|| build_client(policy))
    }

    /// Whether the pool for `policy` has been built.
    #[must_use]
    pub fn is_initialized(&self, policy: TlsPolicy) -> bool {
        match policy {
            TlsPolicy::Verify => self.verified.get().is_some(),
            TlsPolicy::SkipVerify => self.unverified.get().is_some(),
        }
    }
}

fn build_client(policy: TlsPolicy) -> ClientResult<Client> {
    Client::builder()
        .pool_max_idle_per_host(MAX_IDLE_CONNS_PER_HOST)
        .connect_timeout(DIAL_TIMEOUT)
        .tcp_keepalive(DIAL_KEEP_ALIVE)
        .danger_accept_invalid_certs(policy == TlsPolicy::SkipVerify)
        .build()
        .map_err(|source| ClientError::ClientBuild { source })
}

/// Production [`Transport`] backed by reqwest.
#[derive(Debug, Default)]
pub struct HttpTransport {
    pools: ConnectionPools,
}

impl HttpTransport {
    /// Create a transport with empty pools.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pools: ConnectionPools::new(),
        }
    }

    /// Pools backing this transport.
    #[must_use]
    pub const fn pools(&self) -> &ConnectionPools {
        &self.pools
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, request: &TransportRequest) -> ClientResult<RequestOutcome> {
        if request.url.is_empty() {
            return Err(ClientError::EmptyUrl);
        }

        let headers = match request.secret.as_deref().filter(|secret| !secret.is_empty()) {
            Some(secret) => signer::sign(
                &request.url,
                &request.app_id,
                secret,
                signer::timestamp_now_ms(),
            )?,
            None => HeaderMap::new(),
        };

        let client = self.pools.client(request.tls)?;
        debug!(
            url = %request.url,
            signed = !headers.is_empty(),
            timeout_ms = u64::try_from(request.timeout.as_millis()).unwrap_or(u64::MAX),
            "sending config server request"
        );

        let transport_error = |source| ClientError::Transport {
            url: request.url.clone(),
            source,
        };
        let response = client
            .get(&request.url)
            .headers(headers.clone())
            .timeout(request.timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let response_headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport_error)?.to_vec();
        debug!(
            url = %request.url,
            status = status.as_u16(),
            body_len = body.len(),
            "config server responded"
        );

        Ok(RequestOutcome {
            request_url: request.url.clone(),
            request_headers: headers,
            status,
            response_headers,
            body,
        })
    }
}
