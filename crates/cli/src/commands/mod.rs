//! Subcommand implementations.

pub mod ask;
pub mod chat;
pub mod embed;
pub mod serve;
pub mod status;
pub mod tools;

use std::path::Path;

use ragweave_agent::Pipeline;
use ragweave_config::AppConfig;

/// Load the config from `path`, or the default location, with environment
/// overrides applied.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_with_overrides(path),
        None => AppConfig::load(),
    };
    Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Load the config and assemble the pipeline. Commands that call the model
/// pass `needs_model` so a missing API key fails before any work starts.
pub async fn build_pipeline(
    path: Option<&Path>,
    needs_model: bool,
) -> Result<Pipeline, Box<dyn std::error::Error>> {
    let config = load_config(path)?;

    if needs_model && !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    LITELLM_API_KEY=...");
        eprintln!("    OPENAI_API_KEY=...");
        eprintln!("    RAGWEAVE_API_KEY=...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    Ok(Pipeline::from_config(config).await?)
}
