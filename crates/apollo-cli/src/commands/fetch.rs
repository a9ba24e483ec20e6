use apollo_client::{ClientSession, ConfigFetch, FetchMode};

use crate::cli::{FetchArgs, OutputFormat};
use crate::client::CliResult;
use crate::output::render_fetch;

pub(crate) async fn handle_fetch(
    session: &ClientSession,
    args: &FetchArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let fetched = fetch(session, args).await?;
    render_fetch(&fetched, format)
}

pub(crate) async fn fetch(session: &ClientSession, args: &FetchArgs) -> CliResult<ConfigFetch> {
    let mode = if args.cached {
        FetchMode::Cached
    } else {
        FetchMode::NonCached
    };
    let mut query = session.configs(args.namespace.trim()).mode(mode);
    if let Some(release_key) = &args.release_key {
        query = query.release_key(release_key.as_str());
    }
    if let Some(label) = &args.label {
        query = query.label(label.as_str());
    }
    if let Some(messages) = &args.messages {
        query = query.messages(messages.as_str());
    }
    Ok(query.fetch().await?)
}
