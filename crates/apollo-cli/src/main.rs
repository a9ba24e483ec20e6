//! Binary entrypoint for the `apollo` command.

use std::process;

#[tokio::main]
async fn main() {
    process::exit(apollo_cli::run().await);
}
