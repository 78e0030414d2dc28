//! `ragweave embed`: bring the vector store up to date with the knowledge
//! directory.

use std::path::Path;

use super::build_pipeline;

pub async fn run(
    config_path: Option<&Path>,
    force: bool,
    rebuild: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = build_pipeline(config_path, false).await?;
    let supervisor = &pipeline.supervisor;

    println!("  Knowledge dir: {}", pipeline.config.knowledge.dir.display());

    let outcome = if force || rebuild {
        supervisor.refresh_knowledge(rebuild).await.map(|r| (true, r))
    } else {
        supervisor.check_and_update_knowledge().await
    };
    pipeline.shutdown().await;
    let (changed, report) = outcome?;

    if !changed {
        println!("  No changes detected; nothing to embed.");
        return Ok(());
    }

    println!("  Embedded files:  {}", report.embedded_files);
    println!("  Failed files:    {}", report.failed_files);
    println!("  Removed files:   {}", report.removed_files);
    println!("  Documents:       {}", report.documents);
    if report.degraded_documents > 0 {
        println!(
            "  ⚠️  {} document(s) stored with fallback vectors (embedding endpoint unavailable)",
            report.degraded_documents
        );
    }

    if report.succeeded() {
        Ok(())
    } else {
        Err("Embedding failed for every changed file".into())
    }
}
