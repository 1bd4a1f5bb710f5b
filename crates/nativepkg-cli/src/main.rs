//! nativepkg CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nativepkg_cli::cmd::{self, load::HeaderSelection};
use nativepkg_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let platform = cmd::platform_or_host(cli.platform.as_deref());

    match cli.command {
        Commands::Platform => {
            cmd::platform::platform(&platform);
            Ok(())
        }
        Commands::Inspect { root, json } => cmd::inspect::inspect(&root, &platform, json).await,
        Commands::Load {
            root,
            headers,
            all_headers,
        } => {
            let selection = HeaderSelection::from_flags(headers, all_headers);
            cmd::load::load(&root, &platform, &selection).await
        }
    }
}
