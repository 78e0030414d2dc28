//! `ragweave status`: configuration, endpoint reachability and knowledge
//! statistics.

use std::path::Path;

use ragweave_config::AppConfig;

use super::build_pipeline;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = build_pipeline(config_path, false).await?;
    let config = &pipeline.config;

    println!("ragweave status");
    println!("===============");
    println!("  Config dir:    {}", AppConfig::config_dir().display());
    println!("  Model:         {} @ {}", config.model.name, config.model.base_url);
    println!("  API key:       {}", if config.has_api_key() { "set" } else { "missing" });
    let endpoints = pipeline.endpoint_health().await;
    println!(
        "  Reachable:     model {}, embedding {}",
        if endpoints.model { "yes" } else { "no" },
        if endpoints.embedding { "yes" } else { "no" }
    );
    println!(
        "  Embedding:     {} ({} dims) @ {}",
        config.embedding.model,
        config.embedding.dimension,
        config.embedding_base_url()
    );
    println!("  Vector store:  {} / {}", pipeline.store.name(), config.vector_store.index_name);
    println!("  Output dir:    {}", config.agent.output_dir.display());
    println!("  Gateway:       {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "  Telemetry:     {}",
        if config.telemetry.enabled { "enabled" } else { "disabled" }
    );

    match pipeline.supervisor.knowledge().stats().await {
        Ok(stats) => {
            println!();
            println!("  Knowledge:     {}", stats.root);
            println!("    Files:       {} ({} bytes)", stats.files, stats.total_bytes);
            for (ext, count) in &stats.by_extension {
                println!("      .{ext:<8} {count}");
            }
            println!("    Tracked:     {}", stats.tracked_files);
            println!("    Documents:   {}", stats.documents);
            println!(
                "    Pending:     {}",
                if stats.pending_changes { "yes (run `ragweave embed`)" } else { "no" }
            );
        }
        Err(e) => println!("\n  ⚠️  Knowledge stats unavailable: {e}"),
    }

    let config_file = AppConfig::config_dir().join("config.toml");
    if config_path.is_none() && !config_file.exists() {
        println!("\n  No config file at {}; using defaults", config_file.display());
    }

    pipeline.shutdown().await;
    Ok(())
}
