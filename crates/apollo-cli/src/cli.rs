//! Argument parsing and command dispatch.

use std::net::IpAddr;
use std::path::PathBuf;

use apollo_client::config::{
    DEFAULT_CLUSTER, ENV_APP_ID, ENV_CLIENT_IP, ENV_CLUSTER, ENV_CONFIG_TIMEOUT,
    ENV_NOTIFICATION_TIMEOUT, ENV_SECRET, ENV_SERVER_URL, ENV_TLS_SKIP_VERIFY,
};
use apollo_telemetry::{
    DEFAULT_LOG_LEVEL, LOG_FORMAT_ENV, LoggingConfig, init_logging, log_format_from_str,
};
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::Instrument;

use crate::client::{CliResult, connect};
use crate::commands::fetch::handle_fetch;
use crate::commands::watch::{handle_watch, initial_watch_set};

/// Parses CLI arguments, executes the requested command, and reports failures on stderr.
/// Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    init_cli_logging(&cli);

    let span = tracing::info_span!("command", name = command_label(&cli.command));
    match dispatch(cli).instrument(span).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

fn init_cli_logging(cli: &Cli) {
    let config = LoggingConfig {
        level: &cli.log_level,
        format: log_format_from_str(cli.log_format.as_deref()),
        build_sha: option_env!("APOLLO_BUILD_SHA").unwrap_or("dev"),
    };
    if let Err(err) = init_logging(&config) {
        eprintln!("warning: logging disabled: {err}");
    }
}

async fn dispatch(cli: Cli) -> CliResult<()> {
    match &cli.command {
        Command::Fetch(args) => {
            let session = connect(&cli).await?;
            handle_fetch(&session, args, cli.output).await
        }
        Command::Watch(args) => {
            let watch_set = initial_watch_set(args)?;
            let session = connect(&cli).await?;
            handle_watch(&session, watch_set, args, cli.output).await
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "apollo",
    about = "Fetch and watch configuration from an Apollo config service"
)]
pub(crate) struct Cli {
    #[arg(long, global = true, env = ENV_SERVER_URL, help = "Config service base URL")]
    pub(crate) server_url: Option<String>,
    #[arg(long, global = true, env = ENV_APP_ID, help = "Application identifier")]
    pub(crate) app_id: Option<String>,
    #[arg(long, global = true, env = ENV_CLUSTER, default_value = DEFAULT_CLUSTER)]
    pub(crate) cluster: String,
    #[arg(
        long,
        global = true,
        env = ENV_SECRET,
        hide_env_values = true,
        help = "Access key secret used to sign requests"
    )]
    pub(crate) secret: Option<String>,
    #[arg(long, global = true, env = ENV_CONFIG_TIMEOUT, default_value_t = 10)]
    pub(crate) config_timeout_secs: u64,
    #[arg(long, global = true, env = ENV_NOTIFICATION_TIMEOUT, default_value_t = 60)]
    pub(crate) notification_timeout_secs: u64,
    #[arg(
        long,
        global = true,
        env = ENV_TLS_SKIP_VERIFY,
        value_parser = BoolishValueParser::new(),
        help = "Accept any server certificate"
    )]
    pub(crate) tls_skip_verify: bool,
    #[arg(
        long,
        global = true,
        env = ENV_CLIENT_IP,
        help = "IP to report instead of discovering it"
    )]
    pub(crate) client_ip: Option<IpAddr>,
    #[arg(long, global = true, help = "Do not report a client IP")]
    pub(crate) no_client_ip: bool,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for rendered configuration and notifications"
    )]
    pub(crate) output: OutputFormat,
    #[arg(long, global = true, default_value = DEFAULT_LOG_LEVEL)]
    pub(crate) log_level: String,
    #[arg(long, global = true, env = LOG_FORMAT_ENV)]
    pub(crate) log_format: Option<String>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Retrieve one namespace.
    Fetch(FetchArgs),
    /// Long-poll namespaces for changes.
    Watch(WatchArgs),
}

#[derive(Debug, Args, Default)]
pub(crate) struct FetchArgs {
    #[arg(help = "Namespace to retrieve")]
    pub(crate) namespace: String,
    #[arg(long, help = "Use the cached endpoint (flat key/value, no release key)")]
    pub(crate) cached: bool,
    #[arg(long, help = "Release key held by the caller; unchanged data returns 304")]
    pub(crate) release_key: Option<String>,
    #[arg(long, help = "Grey-release label")]
    pub(crate) label: Option<String>,
    #[arg(long, help = "Notification messages JSON from a previous watch")]
    pub(crate) messages: Option<String>,
}

#[derive(Debug, Args, Default)]
pub(crate) struct WatchArgs {
    #[arg(
        required = true,
        value_name = "NAMESPACE[=ID]",
        help = "Namespaces to watch, optionally with the last-known notification id"
    )]
    pub(crate) targets: Vec<String>,
    #[arg(long, help = "Exit after a single long poll")]
    pub(crate) once: bool,
    #[arg(
        long,
        default_value_t = 5,
        help = "Seconds to wait before retrying after a transport failure"
    )]
    pub(crate) retry_secs: u64,
    #[arg(long, help = "Persist notification ids to this file and resume from it")]
    pub(crate) state_file: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}

const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Fetch(_) => "fetch",
        Command::Watch(_) => "watch",
    }
}
