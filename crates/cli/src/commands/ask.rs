//! `ragweave ask`: run one question through the pipeline.

use std::path::Path;

use ragweave_agent::{TaskReport, TaskStatus};

use super::build_pipeline;

pub async fn run(
    config_path: Option<&Path>,
    question: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = build_pipeline(config_path, true).await?;

    eprint!("  Thinking...");
    let report = pipeline.supervisor.execute_task(question).await;
    eprint!("\r              \r");
    pipeline.shutdown().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    match &report.status {
        TaskStatus::Completed => Ok(()),
        TaskStatus::Aborted { stage, error } => {
            Err(format!("Task aborted at stage '{stage}': {error}").into())
        }
    }
}

/// Human-readable answer plus a one-line stage summary.
pub fn print_report(report: &TaskReport) {
    if let Some(answer) = &report.final_answer {
        println!("{}", answer.trim());
    }
    let summary = report.summary();
    eprintln!();
    eprintln!(
        "  [{} stage(s) ok, {} failed, {} ms]",
        summary.succeeded, summary.failed, report.processing_time_ms
    );
}
