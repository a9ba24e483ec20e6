//! Base URL resolution into validated host/port/scheme/path components.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use url::{Host, ParseError, Url};

use crate::error::{ClientError, ClientResult};

/// URL schemes the configuration service can be reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
}

impl Scheme {
    /// Lowercase scheme name as it appears in a URL.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Port used when the URL does not name one.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

impl FromStr for Scheme {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            _ => Err(()),
        }
    }
}

impl Display for Scheme {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Validated components of a service URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAddress {
    /// URL scheme.
    pub scheme: Scheme,
    /// Hostname or IP literal, without IPv6 brackets.
    pub host: String,
    /// Explicit port, or the scheme default.
    pub port: u16,
    /// `host:port`, dialable as-is (IPv6 hosts are bracketed).
    pub address: String,
    /// Path followed by `?` and the raw query when a query is present.
    pub path_with_query: String,
}

/// Parse `raw` into a [`ServiceAddress`].
///
/// Only `http` and `https` are accepted. The query string is kept byte-for-byte so
/// the result can be signed exactly as it will be sent.
///
/// # Errors
///
/// Returns [`ClientError::InvalidUrl`] for malformed URLs, unsupported schemes, or a
/// missing host, and [`ClientError::InvalidPort`] when the port is not an integer in
/// `0..=65535`.
pub fn resolve(raw: &str) -> ClientResult<ServiceAddress> {
    let parsed = Url::parse(raw).map_err(|err| match err {
        ParseError::InvalidPort => ClientError::InvalidPort {
            url: raw.to_string(),
        },
        other => invalid_url(raw, other.to_string()),
    })?;
    resolve_parsed(raw, &parsed)
}

fn resolve_parsed(raw: &str, parsed: &Url) -> ClientResult<ServiceAddress> {
    let scheme = parsed
        .scheme()
        .parse::<Scheme>()
        .map_err(|()| invalid_url(raw, "only http and https are supported"))?;

    let (host, address_host) = match parsed.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => {
            (domain.to_string(), domain.to_string())
        }
        Some(Host::Ipv4(ip)) => (ip.to_string(), ip.to_string()),
        Some(Host::Ipv6(ip)) => (ip.to_string(), format!("[{ip}]")),
        _ => return Err(invalid_url(raw, "unable to resolve hostname")),
    };

    // `Url` drops ports equal to the scheme default.
    let port = parsed.port().unwrap_or_else(|| scheme.default_port());

    let mut path_with_query = parsed.path().to_string();
    if let Some(query) = parsed.query().filter(|query| !query.is_empty()) {
        path_with_query.push('?');
        path_with_query.push_str(query);
    }

    Ok(ServiceAddress {
        scheme,
        address: format!("{address_host}:{port}"),
        host,
        port,
        path_with_query,
    })
}

fn invalid_url(raw: &str, reason: impl Into<String>) -> ClientError {
    ClientError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.into(),
    }
}
