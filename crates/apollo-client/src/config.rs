//! Session settings and their environment-variable loader.

use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

use crate::probe::DEFAULT_PROBE_TIMEOUT;
use crate::transport::TlsPolicy;

/// Cluster used when none is configured.
pub const DEFAULT_CLUSTER: &str = "default";
/// Round-trip bound for configuration retrieval.
pub const DEFAULT_CONFIG_TIMEOUT: Duration = Duration::from_secs(10);
/// Round-trip bound for the notification long poll.
pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Base URL of the configuration service.
pub const ENV_SERVER_URL: &str = "APOLLO_CONFIG_SERVER_URL";
/// Application identifier.
pub const ENV_APP_ID: &str = "APOLLO_APP_ID";
/// Cluster name.
pub const ENV_CLUSTER: &str = "APOLLO_CLUSTER";
/// Access key secret; unset or empty disables signing.
pub const ENV_SECRET: &str = "APOLLO_ACCESS_KEY_SECRET";
/// Retrieval timeout in whole seconds.
pub const ENV_CONFIG_TIMEOUT: &str = "APOLLO_CONFIG_TIMEOUT_SECS";
/// Long-poll timeout in whole seconds.
pub const ENV_NOTIFICATION_TIMEOUT: &str = "APOLLO_NOTIFICATION_TIMEOUT_SECS";
/// Accept any server certificate when truthy.
pub const ENV_TLS_SKIP_VERIFY: &str = "APOLLO_TLS_SKIP_VERIFY";
/// Attach the outbound IP to retrieval requests unless falsy.
pub const ENV_REPORT_CLIENT_IP: &str = "APOLLO_REPORT_CLIENT_IP";
/// Fixed IP reported instead of discovering one.
pub const ENV_CLIENT_IP: &str = "APOLLO_CLIENT_IP";

/// Failure to load [`SessionConfig`] from the environment.
#[derive(Debug, Error)]
pub enum ConfigEnvError {
    /// A required variable was unset or empty.
    #[error("missing required environment variable {name}")]
    Missing {
        /// Variable name.
        name: &'static str,
    },
    /// A variable was set to a value that does not parse.
    #[error("invalid value '{value}' for environment variable {name}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Everything a [`crate::ClientSession`] needs; immutable once the session is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Base URL of the configuration service, optionally with a path prefix.
    pub base_url: String,
    /// Application identifier.
    pub app_id: String,
    /// Cluster name.
    pub cluster: String,
    /// Access key secret; `None` or empty sends requests unsigned.
    pub secret: Option<String>,
    /// Round-trip bound for retrieval.
    pub config_timeout: Duration,
    /// Round-trip bound for the notification long poll.
    pub notification_timeout: Duration,
    /// Certificate verification policy for HTTPS.
    pub tls_policy: TlsPolicy,
    /// Whether retrieval requests carry the `ip` parameter.
    pub report_client_ip: bool,
    /// Reported IP overriding discovery.
    pub client_ip: Option<IpAddr>,
    /// Bound on the construction-time connectivity probe.
    pub probe_timeout: Duration,
}

impl SessionConfig {
    /// Settings for `app_id` at `base_url` with every other field defaulted.
    #[must_use]
    pub fn new(base_url: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            app_id: app_id.into(),
            cluster: DEFAULT_CLUSTER.to_string(),
            secret: None,
            config_timeout: DEFAULT_CONFIG_TIMEOUT,
            notification_timeout: DEFAULT_NOTIFICATION_TIMEOUT,
            tls_policy: TlsPolicy::default(),
            report_client_ip: true,
            client_ip: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Use `cluster` instead of the default.
    #[must_use]
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    /// Sign every request with `secret`.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Override the retrieval timeout.
    #[must_use]
    pub const fn with_config_timeout(mut self, timeout: Duration) -> Self {
        self.config_timeout = timeout;
        self
    }

    /// Override the long-poll timeout.
    #[must_use]
    pub const fn with_notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }

    /// Select the certificate verification policy.
    #[must_use]
    pub const fn with_tls_policy(mut self, policy: TlsPolicy) -> Self {
        self.tls_policy = policy;
        self
    }

    /// Enable or disable the `ip` retrieval parameter.
    #[must_use]
    pub const fn with_report_client_ip(mut self, report: bool) -> Self {
        self.report_client_ip = report;
        self
    }

    /// Report `ip` instead of discovering the outbound address.
    #[must_use]
    pub const fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Override the connectivity probe bound.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Load settings from the process environment.
    ///
    /// # Errors
    ///
    /// See [`SessionConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigEnvError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through `lookup`, which maps a variable name to its value.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigEnvError::Missing`] when the server URL or application id is absent
    /// and [`ConfigEnvError::Invalid`] when a timeout, flag, or IP does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigEnvError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &'static str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let require =
            |name: &'static str| read(name).ok_or(ConfigEnvError::Missing { name });

        let mut config = Self::new(require(ENV_SERVER_URL)?, require(ENV_APP_ID)?);
        if let Some(cluster) = read(ENV_CLUSTER) {
            config.cluster = cluster;
        }
        config.secret = read(ENV_SECRET);
        if let Some(value) = read(ENV_CONFIG_TIMEOUT) {
            config.config_timeout = parse_secs(ENV_CONFIG_TIMEOUT, value)?;
        }
        if let Some(value) = read(ENV_NOTIFICATION_TIMEOUT) {
            config.notification_timeout = parse_secs(ENV_NOTIFICATION_TIMEOUT, value)?;
        }
        if let Some(value) = read(ENV_TLS_SKIP_VERIFY)
            && parse_flag(ENV_TLS_SKIP_VERIFY, value)?
        {
            config.tls_policy = TlsPolicy::SkipVerify;
        }
        if let Some(value) = read(ENV_REPORT_CLIENT_IP) {
            config.report_client_ip = parse_flag(ENV_REPORT_CLIENT_IP, value)?;
        }
        if let Some(value) = read(ENV_CLIENT_IP) {
            config.client_ip = Some(
                value
                    .parse()
                    .map_err(|_| ConfigEnvError::Invalid { name: ENV_CLIENT_IP, value })?,
            );
        }
        Ok(config)
    }
}

fn parse_secs(name: &'static str, value: String) -> Result<Duration, ConfigEnvError> {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigEnvError::Invalid { name, value }),
    }
}

fn parse_flag(name: &'static str, value: String) -> Result<bool, ConfigEnvError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigEnvError::Invalid { name, value }),
    }
}
