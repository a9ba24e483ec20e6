//! Multi-namespace change notification (long poll) over `/notifications/v2`.

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::configs::{NotificationMessages, append_query, endpoint_url};
use crate::error::{ClientError, ClientResult};
use crate::session::ClientSession;
use crate::transport::RequestOutcome;

/// Version meaning "never observed": the server answers immediately with the current one.
pub const UNOBSERVED_NOTIFICATION_ID: i64 = -1;

/// Namespace name to last-known notification id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchSet(BTreeMap<String, i64>);

impl WatchSet {
    /// Create an empty watch set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Watch every name in `namespaces` from [`UNOBSERVED_NOTIFICATION_ID`].
    #[must_use]
    pub fn unobserved<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        namespaces
            .into_iter()
            .map(|namespace| (namespace.into(), UNOBSERVED_NOTIFICATION_ID))
            .collect()
    }

    /// Set the version for `namespace`, returning the previous one.
    pub fn insert(&mut self, namespace: impl Into<String>, notification_id: i64) -> Option<i64> {
        self.0.insert(namespace.into(), notification_id)
    }

    /// Version recorded for `namespace`.
    #[must_use]
    pub fn get(&self, namespace: &str) -> Option<i64> {
        self.0.get(namespace).copied()
    }

    /// Number of watched namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no namespace is watched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate namespaces and versions in name order.
    #[must_use]
    pub fn iter(&self) -> btree_map::Iter<'_, String, i64> {
        self.0.iter()
    }

    /// Overwrite versions with those reported in `updates`; other namespaces keep theirs.
    pub fn merge(&mut self, updates: &Self) {
        for (namespace, notification_id) in updates {
            self.0.insert(namespace.clone(), *notification_id);
        }
    }

    /// JSON array of `{namespaceName, notificationId}` sent as `notifications`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Encode`] if serialisation fails.
    pub fn to_query_value(&self) -> ClientResult<String> {
        let entries: Vec<WatchEntry<'_>> = self
            .iter()
            .map(|(namespace_name, notification_id)| WatchEntry {
                namespace_name,
                notification_id: *notification_id,
            })
            .collect();
        serde_json::to_string(&entries).map_err(|source| ClientError::Encode {
            what: "watch set",
            source,
        })
    }
}

impl FromIterator<(String, i64)> for WatchSet {
    fn from_iter<T: IntoIterator<Item = (String, i64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a WatchSet {
    type Item = (&'a String, &'a i64);
    type IntoIter = btree_map::Iter<'a, String, i64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for WatchSet {
    type Item = (String, i64);
    type IntoIter = btree_map::IntoIter<String, i64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WatchEntry<'a> {
    namespace_name: &'a str,
    notification_id: i64,
}

/// One namespace reported by the notification endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Namespace name.
    pub namespace_name: String,
    /// Current notification id.
    pub notification_id: i64,
    /// Notification state to pass into a non-cached retrieval, when supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<NotificationMessages>,
}

/// Build the `/notifications/v2` URL for `watch_set`.
///
/// # Errors
///
/// Returns [`ClientError::EmptyWatchSet`] for an empty set, otherwise URL or encoding
/// errors.
pub fn build_notification_url(
    base_url: &str,
    app_id: &str,
    cluster: &str,
    watch_set: &WatchSet,
) -> ClientResult<Url> {
    if watch_set.is_empty() {
        return Err(ClientError::EmptyWatchSet);
    }
    let notifications = watch_set.to_query_value()?;
    let mut url = endpoint_url(base_url, &["notifications", "v2"])?;
    append_query(
        &mut url,
        &[
            ("appId", Some(app_id)),
            ("cluster", Some(cluster)),
            ("notifications", Some(notifications.as_str())),
        ],
    );
    Ok(url)
}

/// Interpret a notification response.
///
/// # Errors
///
/// Any status other than 200 yields [`ClientError::NotificationRejected`] carrying the
/// raw body; malformed bodies yield [`ClientError::Decode`].
pub fn interpret_notification_response(outcome: &RequestOutcome) -> ClientResult<Vec<Notification>> {
    if !outcome.is_data_returned() {
        return Err(ClientError::NotificationRejected {
            url: outcome.request_url.clone(),
            status: outcome.status.as_u16(),
            body: outcome.body_text(),
        });
    }
    if outcome.body.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(&outcome.body)?)
}

impl ClientSession {
    /// Long-poll for changes to `watch_set`, returning the decoded notifications.
    ///
    /// The server holds the request open until a watched version moves or its own
    /// long-poll window closes, so this uses the notification timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EmptyWatchSet`] before any network activity for an empty
    /// set; otherwise transport, status, and decode errors.
    pub async fn poll_notifications(&self, watch_set: &WatchSet) -> ClientResult<Vec<Notification>> {
        let config = self.config();
        let url = build_notification_url(&config.base_url, &config.app_id, &config.cluster, watch_set)?;
        let outcome = self
            .send(url.as_str(), config.notification_timeout)
            .await?;
        let notifications = interpret_notification_response(&outcome)?;
        debug!(
            watched = watch_set.len(),
            reported = notifications.len(),
            "notifications received"
        );
        Ok(notifications)
    }

    /// Long-poll for changes and return the versions the server reported.
    ///
    /// Only reported namespaces are returned; merging into the caller's set is left to
    /// the caller (see [`WatchSet::merge`]).
    ///
    /// # Errors
    ///
    /// Same as [`ClientSession::poll_notifications`].
    pub async fn watch(&self, watch_set: &WatchSet) -> ClientResult<WatchSet> {
        Ok(self
            .poll_notifications(watch_set)
            .await?
            .into_iter()
            .map(|notification| (notification.namespace_name, notification.notification_id))
            .collect())
    }
}
