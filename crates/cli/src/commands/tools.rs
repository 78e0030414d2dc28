//! `ragweave tools`: list the tools the model can call.

use std::path::Path;

use super::build_pipeline;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = build_pipeline(config_path, false).await?;

    println!("  Connectors: {}", pipeline.connectors.connector_names().join(", "));
    println!();
    let mut definitions = pipeline.connectors.definitions();
    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    for def in &definitions {
        println!("  {:<32} {}", def.name, def.description);
    }
    if definitions.is_empty() {
        println!("  (no tools available)");
    }

    pipeline.shutdown().await;
    Ok(())
}
