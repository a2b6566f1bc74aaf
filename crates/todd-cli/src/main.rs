use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todd_cli=debug,todd_tracker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let mut settings = todd_core::Settings::load(cli.config.as_deref())?;
    if cli.github_token.is_some() {
        settings.github_token = cli.github_token;
    }
    tracing::debug!("Using GitHub org {}", settings.github_org);

    commands::execute(cli.command, settings).await
}
