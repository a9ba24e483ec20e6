//! Output renderers and formatting helpers for CLI commands.

use anyhow::anyhow;
use apollo_client::{ConfigFetch, ConfigurationSet, Notification};
use serde_json::json;

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};

pub(crate) fn render_fetch(fetch: &ConfigFetch, format: OutputFormat) -> CliResult<()> {
    println!("{}", format_fetch(fetch, format)?);
    Ok(())
}

pub(crate) fn render_notification(
    notification: &Notification,
    format: OutputFormat,
) -> CliResult<()> {
    println!("{}", format_notification(notification, format)?);
    Ok(())
}

pub(crate) fn format_fetch(fetch: &ConfigFetch, format: OutputFormat) -> CliResult<String> {
    match (fetch, format) {
        (ConfigFetch::Unchanged, OutputFormat::Table) => Ok("unchanged".to_string()),
        (ConfigFetch::Unchanged, OutputFormat::Json) => to_json(&json!({ "unchanged": true })),
        (ConfigFetch::Changed(set), OutputFormat::Json) => to_json(set),
        (ConfigFetch::Changed(set), OutputFormat::Table) => Ok(format_configuration_table(set)),
    }
}

fn format_configuration_table(set: &ConfigurationSet) -> String {
    let mut lines = vec![format!(
        "namespace: {}/{}/{}",
        set.app_id, set.cluster, set.namespace_name
    )];
    if let Some(release_key) = &set.release_key {
        lines.push(format!("release: {release_key}"));
    }

    let mut entries: Vec<_> = set.configurations.iter().collect();
    entries.sort_by(|left, right| left.0.cmp(right.0));
    let width = entries
        .iter()
        .map(|(key, _)| key.len())
        .max()
        .unwrap_or(0)
        .max("KEY".len());
    lines.push(format!("{:<width$} VALUE", "KEY"));
    for (key, value) in entries {
        lines.push(format!("{key:<width$} {value}"));
    }
    lines.join("\n")
}

pub(crate) fn format_notification(
    notification: &Notification,
    format: OutputFormat,
) -> CliResult<String> {
    match format {
        OutputFormat::Json => to_json(notification),
        OutputFormat::Table => Ok(format!(
            "changed: {} -> {}",
            notification.namespace_name, notification.notification_id
        )),
    }
}

fn to_json(value: &impl serde::Serialize) -> CliResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
}
