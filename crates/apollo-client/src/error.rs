//! Error types for configuration retrieval and change-watch operations.
//!
//! # Design
//! - One enum covers every failure a single call can produce; none are retried here.
//! - Source errors are preserved rather than stringified.
//! - Only the notification endpoint surfaces the raw response body.

use thiserror::Error;

/// Primary error type for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// URL could not be parsed, used an unsupported scheme, or had no host.
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl {
        /// URL supplied by the caller.
        url: String,
        /// Why the URL was rejected.
        reason: String,
    },
    /// URL carried a port that is not an integer within `0..=65535`.
    #[error("invalid port in url '{url}'")]
    InvalidPort {
        /// URL supplied by the caller.
        url: String,
    },
    /// Application identifier was empty.
    #[error("application id is empty")]
    EmptyAppId,
    /// A request or base URL was empty.
    #[error("url is empty")]
    EmptyUrl,
    /// Construction-time connectivity probe failed.
    #[error("port {port} on {host} is closed or not reachable")]
    PortUnreachable {
        /// Host that was probed.
        host: String,
        /// Port that was probed.
        port: u16,
    },
    /// Network, TLS, timeout, or body-read failure.
    #[error("request to {url} failed")]
    Transport {
        /// URL of the failed request.
        url: String,
        /// Underlying HTTP client error.
        source: reqwest::Error,
    },
    /// The HTTP connection pool could not be constructed.
    #[error("failed to build http client")]
    ClientBuild {
        /// Underlying HTTP client error.
        source: reqwest::Error,
    },
    /// Configuration endpoint answered with a status outside its accepted set.
    #[error("{url} returns HTTP status code: {status}")]
    UnexpectedStatus {
        /// URL of the request.
        url: String,
        /// Status code returned by the server.
        status: u16,
    },
    /// Notification endpoint answered with a non-200 status.
    #[error("{body}")]
    NotificationRejected {
        /// URL of the request.
        url: String,
        /// Status code returned by the server.
        status: u16,
        /// Raw response body, lossily decoded as UTF-8.
        body: String,
    },
    /// Response body was not valid JSON for the expected shape.
    #[error("failed to decode response body")]
    Decode {
        /// Underlying serde error.
        #[from]
        source: serde_json::Error,
    },
    /// Watch set or notification messages could not be encoded.
    #[error("failed to encode {what}")]
    Encode {
        /// Payload that failed to encode.
        what: &'static str,
        /// Underlying serde error.
        source: serde_json::Error,
    },
    /// Retrieval was requested without a namespace.
    #[error("namespace name is empty")]
    MissingNamespace,
    /// Watch was requested with no namespaces.
    #[error("watch set is empty")]
    EmptyWatchSet,
    /// A value could not be carried in an HTTP header.
    #[error("invalid value for header {header}")]
    InvalidHeader {
        /// Header name.
        header: &'static str,
    },
    /// Secret could not be used as an HMAC key.
    #[error("access key secret cannot be used as a signing key")]
    InvalidSecret,
}

impl ClientError {
    /// HTTP status carried by the error, if the server answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } | Self::NotificationRejected { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Whether the failure happened below HTTP (connect, TLS, timeout, body read).
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Convenience alias for client results.
pub type ClientResult<T> = Result<T, ClientError>;
