//! Configuration retrieval over the cached and non-cached endpoints.
//!
//! # Design
//! - `FetchMode` carries both the endpoint path and the accepted status set.
//! - URL construction and response interpretation are pure; `ConfigQuery::fetch` wires
//!   them to the session's transport.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::session::ClientSession;
use crate::transport::RequestOutcome;

/// Which configuration endpoint to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// `/configfiles/json/{appId}/{cluster}/{namespace}`; served from the server cache,
    /// returns a flat key/value object and never a release key.
    Cached,
    /// `/configs/{appId}/{cluster}/{namespace}`; read through to the database,
    /// returns a release key and may answer 304 when nothing changed.
    #[default]
    NonCached,
}

impl FetchMode {
    /// Leading path segments of the endpoint.
    #[must_use]
    pub const fn endpoint_segments(self) -> &'static [&'static str] {
        match self {
            Self::Cached => &["configfiles", "json"],
            Self::NonCached => &["configs"],
        }
    }

    /// Whether `status` is a success for this endpoint.
    #[must_use]
    pub const fn accepts(self, status: u16) -> bool {
        match self {
            Self::Cached => status == 200,
            Self::NonCached => status == 200 || status == 304,
        }
    }
}

/// Configuration of one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSet {
    /// Application identity.
    pub app_id: String,
    /// Cluster name.
    pub cluster: String,
    /// Namespace name.
    pub namespace_name: String,
    /// Key/value entries.
    #[serde(default)]
    pub configurations: HashMap<String, String>,
    /// Release snapshot identifier; absent for the cached endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_key: Option<String>,
}

/// Result of a successful retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigFetch {
    /// Server returned a configuration.
    Changed(ConfigurationSet),
    /// Server reported nothing changed since the supplied release key (304).
    Unchanged,
}

impl ConfigFetch {
    /// Whether the server reported no change.
    #[must_use]
    pub const fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }

    /// The returned configuration, if any.
    #[must_use]
    pub fn into_configuration(self) -> Option<ConfigurationSet> {
        match self {
            Self::Changed(set) => Some(set),
            Self::Unchanged => None,
        }
    }
}

/// Last-known notification state sent as the `messages` parameter.
///
/// Keys are `{appId}+{cluster}+{namespace}`; values are notification ids.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationMessages {
    /// Notification id per watched key.
    #[serde(default)]
    pub details: BTreeMap<String, i64>,
}

impl NotificationMessages {
    /// Key used by the server for one namespace.
    #[must_use]
    pub fn key(app_id: &str, cluster: &str, namespace: &str) -> String {
        format!("{app_id}+{cluster}+{namespace}")
    }

    /// Record `notification_id` for a key.
    pub fn insert(&mut self, key: impl Into<String>, notification_id: i64) {
        self.details.insert(key.into(), notification_id);
    }

    /// JSON text suitable for the `messages` query parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Encode`] if serialisation fails.
    pub fn to_query_value(&self) -> ClientResult<String> {
        serde_json::to_string(self).map_err(|source| ClientError::Encode {
            what: "notification messages",
            source,
        })
    }
}

/// Identity a configuration request is scoped to.
#[derive(Debug, Clone, Copy)]
pub struct ConfigScope<'a> {
    /// Application identity.
    pub app_id: &'a str,
    /// Cluster name.
    pub cluster: &'a str,
    /// Namespace name.
    pub namespace: &'a str,
}

/// Optional parameters of a non-cached request. Empty values are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigParams {
    /// Last-known release key.
    pub release_key: Option<String>,
    /// Serialised last-known notification state.
    pub messages: Option<String>,
    /// Gray-release label.
    pub label: Option<String>,
}

/// Build the request URL for `mode`.
///
/// The cached endpoint only ever carries `ip`; the non-cached endpoint carries
/// `ip`, `label`, `messages`, and `releaseKey` when non-empty.
///
/// # Errors
///
/// Returns [`ClientError::InvalidUrl`] if `base_url` cannot take path segments.
pub fn build_config_url(
    base_url: &str,
    mode: FetchMode,
    scope: ConfigScope<'_>,
    params: &ConfigParams,
    ip: Option<IpAddr>,
) -> ClientResult<Url> {
    let mut url = endpoint_url(base_url, mode.endpoint_segments())?;
    append_path(&mut url, base_url, &[scope.app_id, scope.cluster, scope.namespace])?;

    let ip = ip.map(|ip| ip.to_string());
    let pairs: Vec<(&str, Option<&str>)> = match mode {
        FetchMode::Cached => vec![("ip", ip.as_deref())],
        FetchMode::NonCached => vec![
            ("ip", ip.as_deref()),
            ("label", params.label.as_deref()),
            ("messages", params.messages.as_deref()),
            ("releaseKey", params.release_key.as_deref()),
        ],
    };
    append_query(&mut url, &pairs);
    Ok(url)
}

pub(crate) fn endpoint_url(base_url: &str, segments: &[&str]) -> ClientResult<Url> {
    let mut url = Url::parse(base_url.trim_end_matches('/')).map_err(|err| {
        ClientError::InvalidUrl {
            url: base_url.to_string(),
            reason: err.to_string(),
        }
    })?;
    url.set_query(None);
    append_path(&mut url, base_url, segments)?;
    Ok(url)
}

fn append_path(url: &mut Url, base_url: &str, segments: &[&str]) -> ClientResult<()> {
    url.path_segments_mut()
        .map_err(|()| ClientError::InvalidUrl {
            url: base_url.to_string(),
            reason: "url cannot be a base".into(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(())
}

pub(crate) fn append_query(url: &mut Url, pairs: &[(&str, Option<&str>)]) {
    let present: Vec<(&str, &str)> = pairs
        .iter()
        .filter_map(|(key, value)| value.filter(|value| !value.is_empty()).map(|value| (*key, value)))
        .collect();
    if present.is_empty() {
        return;
    }
    url.query_pairs_mut().extend_pairs(present);
}

/// Interpret a transport outcome according to `mode`.
///
/// # Errors
///
/// Returns [`ClientError::UnexpectedStatus`] for statuses outside the mode's accepted
/// set and [`ClientError::Decode`] for malformed bodies.
pub fn interpret_config_response(
    mode: FetchMode,
    scope: ConfigScope<'_>,
    outcome: &RequestOutcome,
) -> ClientResult<ConfigFetch> {
    let status = outcome.status.as_u16();
    if !mode.accepts(status) {
        return Err(ClientError::UnexpectedStatus {
            url: outcome.request_url.clone(),
            status,
        });
    }
    if outcome.is_data_unchanged() {
        return Ok(ConfigFetch::Unchanged);
    }

    let scoped = |configurations: HashMap<String, String>| ConfigurationSet {
        app_id: scope.app_id.to_string(),
        cluster: scope.cluster.to_string(),
        namespace_name: scope.namespace.to_string(),
        configurations,
        release_key: None,
    };

    let set = match mode {
        FetchMode::Cached if outcome.body.is_empty() => scoped(HashMap::new()),
        FetchMode::Cached => scoped(serde_json::from_slice(&outcome.body)?),
        FetchMode::NonCached if outcome.body.is_empty() => scoped(HashMap::new()),
        FetchMode::NonCached => serde_json::from_slice(&outcome.body)?,
    };
    Ok(ConfigFetch::Changed(set))
}

/// Builder for a single retrieval, created by [`ClientSession::configs`].
#[derive(Debug, Clone)]
#[must_use = "a config query does nothing until `fetch` is awaited"]
pub struct ConfigQuery<'a> {
    session: &'a ClientSession,
    namespace: String,
    mode: FetchMode,
    params: ConfigParams,
}

impl<'a> ConfigQuery<'a> {
    pub(crate) fn new(session: &'a ClientSession, namespace: String) -> Self {
        Self {
            session,
            namespace,
            mode: FetchMode::NonCached,
            params: ConfigParams::default(),
        }
    }

    /// Select the endpoint.
    pub fn mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Use the cached endpoint.
    pub fn cached(self) -> Self {
        self.mode(FetchMode::Cached)
    }

    /// Last-known release key; lets the server answer 304.
    pub fn release_key(mut self, release_key: impl Into<String>) -> Self {
        self.params.release_key = Some(release_key.into());
        self
    }

    /// Raw serialised notification state for the `messages` parameter.
    pub fn messages(mut self, messages: impl Into<String>) -> Self {
        self.params.messages = Some(messages.into());
        self
    }

    /// Typed notification state for the `messages` parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Encode`] if serialisation fails.
    pub fn notification_messages(self, messages: &NotificationMessages) -> ClientResult<Self> {
        Ok(self.messages(messages.to_query_value()?))
    }

    /// Gray-release label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.params.label = Some(label.into());
        self
    }

    /// Namespace this query targets.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Issue the request and interpret the response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingNamespace`] before any network activity when the
    /// namespace is empty; otherwise transport, status, and decode errors.
    pub async fn fetch(self) -> ClientResult<ConfigFetch> {
        if self.namespace.is_empty() {
            return Err(ClientError::MissingNamespace);
        }

        let config = self.session.config();
        let scope = ConfigScope {
            app_id: &config.app_id,
            cluster: &config.cluster,
            namespace: &self.namespace,
        };
        let ip = self.session.client_ip().await;
        let url = build_config_url(&config.base_url, self.mode, scope, &self.params, ip)?;

        let outcome = self
            .session
            .send(url.as_str(), config.config_timeout)
            .await?;
        let fetched = interpret_config_response(self.mode, scope, &outcome)?;
        debug!(
            namespace = %self.namespace,
            mode = ?self.mode,
            unchanged = fetched.is_unchanged(),
            "configuration fetched"
        );
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use reqwest::header::HeaderMap;

    const SCOPE: ConfigScope<'static> = ConfigScope {
        app_id: "app1",
        cluster: "default",
        namespace: "application",
    };

    fn outcome(status: u16, body: &str) -> RequestOutcome {
        RequestOutcome {
            request_url: "http://config/configs/app1/default/application".into(),
            request_headers: HeaderMap::new(),
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            response_headers: HeaderMap::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn modes_accept_their_status_sets() {
        assert!(FetchMode::Cached.accepts(200));
        assert!(!FetchMode::Cached.accepts(304));
        assert!(FetchMode::NonCached.accepts(200));
        assert!(FetchMode::NonCached.accepts(304));
        assert!(!FetchMode::NonCached.accepts(404));
    }

    #[test]
    fn cached_url_carries_only_ip() -> ClientResult<()> {
        let params = ConfigParams {
            release_key: Some("r1".into()),
            messages: None,
            label: Some("gray".into()),
        };
        let url = build_config_url(
            "http://config.example.com:8080/",
            FetchMode::Cached,
            ConfigScope {
                app_id: "apollo-client-test",
                cluster: "default",
                namespace: "application",
            },
            &params,
            Some(IpAddr::from([10, 4, 123, 251])),
        )?;
        assert_eq!(
            url.as_str(),
            "http://config.example.com:8080/configfiles/json/apollo-client-test/default/application?ip=10.4.123.251"
        );

        let without_ip =
            build_config_url("http://config", FetchMode::Cached, SCOPE, &params, None)?;
        assert_eq!(
            without_ip.as_str(),
            "http://config/configfiles/json/app1/default/application"
        );
        Ok(())
    }

    #[test]
    fn non_cached_url_omits_empty_parameters() -> ClientResult<()> {
        let bare = build_config_url(
            "http://config",
            FetchMode::NonCached,
            SCOPE,
            &ConfigParams::default(),
            None,
        )?;
        assert_eq!(bare.as_str(), "http://config/configs/app1/default/application");

        let params = ConfigParams {
            release_key: Some("20240729-r1".into()),
            messages: Some(String::new()),
            label: Some("canary".into()),
        };
        let full = build_config_url(
            "http://config/apollo",
            FetchMode::NonCached,
            SCOPE,
            &params,
            Some(IpAddr::from([10, 0, 0, 7])),
        )?;
        assert_eq!(
            full.as_str(),
            "http://config/apollo/configs/app1/default/application?ip=10.0.0.7&label=canary&releaseKey=20240729-r1"
        );
        Ok(())
    }

    #[test]
    fn messages_are_form_encoded() -> ClientResult<()> {
        let mut messages = NotificationMessages::default();
        messages.insert(NotificationMessages::key("app1", "default", "application"), 42);
        let params = ConfigParams {
            messages: Some(messages.to_query_value()?),
            ..ConfigParams::default()
        };
        let url = build_config_url("http://config", FetchMode::NonCached, SCOPE, &params, None)?;
        assert_eq!(
            url.query(),
            Some("messages=%7B%22details%22%3A%7B%22app1%2Bdefault%2Bapplication%22%3A42%7D%7D")
        );
        Ok(())
    }

    #[test]
    fn cached_body_is_wrapped_without_release_key() -> ClientResult<()> {
        let fetched = interpret_config_response(
            FetchMode::Cached,
            SCOPE,
            &outcome(200, r#"{"timeout":"100","name":"demo"}"#),
        )?;
        let ConfigFetch::Changed(set) = fetched else {
            panic!("expected configuration");
        };
        assert_eq!(set.app_id, "app1");
        assert_eq!(set.namespace_name, "application");
        assert_eq!(set.release_key, None);
        assert_eq!(set.configurations.get("timeout").map(String::as_str), Some("100"));
        Ok(())
    }

    #[test]
    fn cached_empty_body_is_an_empty_configuration() -> ClientResult<()> {
        let fetched = interpret_config_response(FetchMode::Cached, SCOPE, &outcome(200, ""))?;
        assert_eq!(
            fetched.into_configuration().map(|set| set.configurations.len()),
            Some(0)
        );
        Ok(())
    }

    #[test]
    fn cached_rejects_not_modified() {
        let result = interpret_config_response(FetchMode::Cached, SCOPE, &outcome(304, ""));
        assert!(matches!(
            result,
            Err(ClientError::UnexpectedStatus { status: 304, .. })
        ));
    }

    #[test]
    fn non_cached_body_is_decoded_directly() -> ClientResult<()> {
        let body = r#"{"appId":"app1","cluster":"default","namespaceName":"application","configurations":{"k":"v"},"releaseKey":"r1"}"#;
        let fetched = interpret_config_response(FetchMode::NonCached, SCOPE, &outcome(200, body))?;
        let expected = ConfigurationSet {
            app_id: "app1".into(),
            cluster: "default".into(),
            namespace_name: "application".into(),
            configurations: HashMap::from([("k".to_string(), "v".to_string())]),
            release_key: Some("r1".into()),
        };
        assert_eq!(fetched, ConfigFetch::Changed(expected));
        Ok(())
    }

    #[test]
    fn non_cached_not_modified_is_unchanged() -> ClientResult<()> {
        let fetched = interpret_config_response(FetchMode::NonCached, SCOPE, &outcome(304, ""))?;
        assert!(fetched.is_unchanged());
        Ok(())
    }

    #[test]
    fn other_statuses_report_url_and_code() {
        let result =
            interpret_config_response(FetchMode::NonCached, SCOPE, &outcome(500, "boom"));
        match result {
            Err(ClientError::UnexpectedStatus { url, status }) => {
                assert_eq!(url, "http://config/configs/app1/default/application");
                assert_eq!(status, 500);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        for mode in [FetchMode::Cached, FetchMode::NonCached] {
            let result = interpret_config_response(mode, SCOPE, &outcome(200, "{not json"));
            assert!(matches!(result, Err(ClientError::Decode { .. })));
        }
        let non_string_value =
            interpret_config_response(FetchMode::Cached, SCOPE, &outcome(200, r#"{"k":1}"#));
        assert!(matches!(non_string_value, Err(ClientError::Decode { .. })));
    }
}
