use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::anyhow;
use apollo_client::{ClientSession, Notification, UNOBSERVED_NOTIFICATION_ID, WatchSet};
use tracing::debug;

use crate::cli::{OutputFormat, WatchArgs};
use crate::client::{CliError, CliResult};
use crate::output::render_notification;

pub(crate) async fn handle_watch(
    session: &ClientSession,
    mut watch_set: WatchSet,
    args: &WatchArgs,
    format: OutputFormat,
) -> CliResult<()> {
    loop {
        match session.poll_notifications(&watch_set).await {
            Ok(notifications) => {
                for notification in &notifications {
                    render_notification(notification, format)?;
                }
                if record_updates(&mut watch_set, &notifications)
                    && let Some(path) = &args.state_file
                {
                    save_state(path, &watch_set)?;
                }
            }
            // The server closes an idle long poll with 304.
            Err(err) if err.status() == Some(304) => {
                debug!(watched = watch_set.len(), "long poll ended without changes");
            }
            Err(err) if err.is_transport() && !args.once => {
                eprintln!(
                    "watch request failed: {err}. retrying in {}s",
                    args.retry_secs
                );
                tokio::time::sleep(Duration::from_secs(args.retry_secs)).await;
                continue;
            }
            Err(err) => return Err(err.into()),
        }

        if args.once {
            return Ok(());
        }
    }
}

/// Watch set from the command line, with versions resumed from the state file when present.
pub(crate) fn initial_watch_set(args: &WatchArgs) -> CliResult<WatchSet> {
    let mut watch_set = WatchSet::new();
    for target in &args.targets {
        let (namespace, notification_id) = parse_target(target)?;
        watch_set.insert(namespace, notification_id);
    }

    if let Some(path) = &args.state_file
        && let Some(stored) = load_state(path)?
    {
        let resumed: WatchSet = stored
            .into_iter()
            .filter(|(namespace, _)| watch_set.get(namespace).is_some())
            .collect();
        watch_set.merge(&resumed);
    }
    Ok(watch_set)
}

/// Parse `namespace` or `namespace=notification_id`.
pub(crate) fn parse_target(raw: &str) -> CliResult<(String, i64)> {
    let (namespace, notification_id) = match raw.split_once('=') {
        Some((namespace, version)) => {
            let version = version.trim().parse::<i64>().map_err(|_| {
                CliError::validation(format!("invalid notification id in '{raw}'"))
            })?;
            (namespace.trim(), version)
        }
        None => (raw.trim(), UNOBSERVED_NOTIFICATION_ID),
    };
    if namespace.is_empty() {
        return Err(CliError::validation(format!(
            "namespace name is empty in '{raw}'"
        )));
    }
    Ok((namespace.to_string(), notification_id))
}

fn record_updates(watch_set: &mut WatchSet, notifications: &[Notification]) -> bool {
    if notifications.is_empty() {
        return false;
    }
    let updates: WatchSet = notifications
        .iter()
        .map(|notification| {
            (
                notification.namespace_name.clone(),
                notification.notification_id,
            )
        })
        .collect();
    watch_set.merge(&updates);
    true
}

fn load_state(path: &Path) -> CliResult<Option<WatchSet>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(CliError::failure(anyhow!(
                "failed to read state file {}: {err}",
                path.display()
            )));
        }
    };
    serde_json::from_str(&text).map(Some).map_err(|err| {
        CliError::validation(format!(
            "state file {} is not a valid watch set: {err}",
            path.display()
        ))
    })
}

fn save_state(path: &Path, watch_set: &WatchSet) -> CliResult<()> {
    let text = serde_json::to_string_pretty(watch_set)
        .map_err(|err| CliError::failure(anyhow!("failed to encode watch state: {err}")))?;
    fs::write(path, text).map_err(|err| {
        CliError::failure(anyhow!(
            "failed to write state file {}: {err}",
            path.display()
        ))
    })
}
