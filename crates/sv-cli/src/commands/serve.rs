use anyhow::Result;
use sv_config::Config;
use sv_engine::DocumentService;
use sv_server::{AppState, SecureVisionServer};

pub async fn handle(config: &Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let service = DocumentService::from_config(config).await?;
    let state = AppState::new(service, config.server.session_lifetime_hours);

    println!("Starting Secure Vision on {}:{}", host, port);
    println!("  Database: {}", config.database_path().display());
    println!("  Uploads: {}", config.upload_dir().display());
    SecureVisionServer::serve(state, &host, port).await?;

    Ok(())
}
