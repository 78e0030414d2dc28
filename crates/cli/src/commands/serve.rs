//! `ragweave serve`: start the HTTP API server.

use std::path::Path;
use std::sync::Arc;

use ragweave_agent::Pipeline;

use super::load_config;

pub async fn run(
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if !config.has_api_key() {
        tracing::warn!("No model API key configured; queries will fail until one is set");
    }

    println!("ragweave gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);

    let pipeline = Arc::new(Pipeline::from_config(config).await?);
    ragweave_gateway::start(pipeline).await?;

    Ok(())
}
