//! Session construction and error classification for the CLI.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use anyhow::anyhow;
use apollo_client::{ClientError, ClientSession, SessionConfig, TlsPolicy};

use crate::cli::Cli;

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<ClientError> for CliError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::InvalidUrl { .. }
            | ClientError::InvalidPort { .. }
            | ClientError::EmptyAppId
            | ClientError::EmptyUrl
            | ClientError::MissingNamespace
            | ClientError::EmptyWatchSet
            | ClientError::InvalidHeader { .. }
            | ClientError::InvalidSecret => Self::validation(err.to_string()),
            other => Self::failure(other),
        }
    }
}

/// Session settings assembled from global flags and their environment fallbacks.
pub(crate) fn session_config(cli: &Cli) -> CliResult<SessionConfig> {
    let server_url = cli
        .server_url
        .as_deref()
        .ok_or_else(|| CliError::validation("--server-url (or APOLLO_CONFIG_SERVER_URL) is required"))?;
    let app_id = cli
        .app_id
        .as_deref()
        .ok_or_else(|| CliError::validation("--app-id (or APOLLO_APP_ID) is required"))?;
    if cli.config_timeout_secs == 0 || cli.notification_timeout_secs == 0 {
        return Err(CliError::validation("timeouts must be at least one second"));
    }

    let mut config = SessionConfig::new(server_url.trim(), app_id.trim())
        .with_cluster(cli.cluster.trim())
        .with_config_timeout(Duration::from_secs(cli.config_timeout_secs))
        .with_notification_timeout(Duration::from_secs(cli.notification_timeout_secs))
        .with_report_client_ip(!cli.no_client_ip);
    if let Some(secret) = cli.secret.as_deref().map(str::trim).filter(|secret| !secret.is_empty()) {
        config = config.with_secret(secret);
    }
    if cli.tls_skip_verify {
        config = config.with_tls_policy(TlsPolicy::SkipVerify);
    }
    if let Some(ip) = cli.client_ip {
        config = config.with_client_ip(ip);
    }
    Ok(config)
}

/// Validate settings and connect, probing the server once.
pub(crate) async fn connect(cli: &Cli) -> CliResult<ClientSession> {
    let config = session_config(cli)?;
    ClientSession::connect(config).await.map_err(|err| match err {
        ClientError::PortUnreachable { .. } => {
            CliError::failure(anyhow!(err).context("config service is not reachable"))
        }
        other => CliError::from(other),
    })
}
