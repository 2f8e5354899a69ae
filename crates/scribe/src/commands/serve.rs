//! Dynamic server command.

use anyhow::Result;
use scribe_server::BlogServer;

use crate::config::ConfigFile;

/// Run the blog server.
pub async fn run(
    file_config: &ConfigFile,
    host: Option<String>,
    port: Option<u16>,
    open: bool,
) -> Result<()> {
    let mut config = file_config.server_config();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config.open = open;

    if config.oauth.is_empty() {
        tracing::warn!("No [[oauth]] providers configured; commenting is disabled");
    }
    if config.ip_salt.is_empty() {
        tracing::warn!("No IP salt set; set [server] ip_salt or SCRIBE_IP_SALT");
    }

    if let Some(parent) = config.database.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.data_dir)?;

    tracing::info!("Starting blog server on port {}", config.port);

    BlogServer::new(config).start().await?;

    Ok(())
}
