//! Per-request HMAC-SHA1 authentication headers.
//!
//! The server recomputes the signature from the path and query it receives, so the
//! string-to-sign is built from the exact request URL with no re-encoding.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha1::Sha1;

use crate::address;
use crate::error::{ClientError, ClientResult};

/// Header carrying `Apollo <appId>:<signature>`.
pub const HEADER_AUTHORIZATION: &str = "Authorization";
/// Header carrying the millisecond timestamp that was signed.
pub const HEADER_TIMESTAMP: &str = "Timestamp";

const DELIMITER: &str = "\n";

type HmacSha1 = Hmac<Sha1>;

/// Canonical string-to-sign: `timestamp + "\n" + pathWithQuery`.
#[must_use]
pub fn string_to_sign(timestamp_millis: u64, path_with_query: &str) -> String {
    format!("{timestamp_millis}{DELIMITER}{path_with_query}")
}

/// Base64 (standard alphabet) of HMAC-SHA1 over `string_to_sign` keyed by `secret`.
///
/// # Errors
///
/// Returns [`ClientError::InvalidSecret`] if the key is rejected by the MAC.
pub fn hmac_sha1_sign(string_to_sign: &str, secret: &str) -> ClientResult<String> {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).map_err(|_| ClientError::InvalidSecret)?;
    mac.update(string_to_sign.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Signature for a request path issued at `timestamp_millis`.
///
/// # Errors
///
/// Returns [`ClientError::InvalidSecret`] if the key is rejected by the MAC.
pub fn signature(timestamp_millis: u64, path_with_query: &str, secret: &str) -> ClientResult<String> {
    hmac_sha1_sign(&string_to_sign(timestamp_millis, path_with_query), secret)
}

/// Build the `Authorization` and `Timestamp` headers for `request_url`.
///
/// # Errors
///
/// Returns an address error when `request_url` does not resolve, or
/// [`ClientError::InvalidHeader`] when the application id cannot be sent as a header.
pub fn sign(
    request_url: &str,
    app_id: &str,
    secret: &str,
    timestamp_millis: u64,
) -> ClientResult<HeaderMap> {
    let path_with_query = address::resolve(request_url)?.path_with_query;
    let signature = signature(timestamp_millis, &path_with_query, secret)?;

    let authorization = HeaderValue::from_str(&format!("Apollo {app_id}:{signature}")).map_err(
        |_| ClientError::InvalidHeader {
            header: HEADER_AUTHORIZATION,
        },
    )?;
    let timestamp = HeaderValue::from_str(&timestamp_millis.to_string()).map_err(|_| {
        ClientError::InvalidHeader {
            header: HEADER_TIMESTAMP,
        }
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(HEADER_AUTHORIZATION, authorization);
    headers.insert(HEADER_TIMESTAMP, timestamp);
    Ok(headers)
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn timestamp_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
