mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use sv_config::Config;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        commands::completions::handle(shell);
        return Ok(());
    }

    let config = Config::load_at(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => commands::serve::handle(&config, host, port).await,
        Commands::Scan { path, json } => commands::scan::scan(&path, json).await,
        Commands::Mask {
            path,
            categories,
            json,
        } => commands::scan::mask(&path, categories.as_deref(), json).await,
        Commands::Encrypt {
            path,
            remove_original,
        } => commands::crypt::encrypt(&config, &path, remove_original).await,
        Commands::Decrypt { path } => commands::crypt::decrypt(&config, &path).await,
        Commands::User(user_cmd) => commands::user::handle(user_cmd, &config).await,
        Commands::Completions { .. } => Ok(()),
    }
}
