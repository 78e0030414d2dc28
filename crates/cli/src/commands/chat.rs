//! `ragweave chat`: interactive question loop.
//!
//! Every line is a fresh task; nothing carries over between questions.

use std::io::Write;
use std::path::Path;

use ragweave_agent::TaskStatus;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::build_pipeline;

/// Words that end the session.
const EXIT_WORDS: [&str; 3] = ["exit", "quit", "bye"];

pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    EXIT_WORDS.iter().any(|w| line.eq_ignore_ascii_case(w))
}

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = build_pipeline(config_path, true).await?;
    let config = &pipeline.config;

    println!();
    println!("  ragweave: interactive mode");
    println!();
    println!("  Model:      {}", config.model.name);
    println!("  Knowledge:  {}", config.knowledge.dir.display());
    println!("  Tools:      {}", pipeline.connectors.tool_count());
    println!();
    println!("  Type your question and press Enter.");
    println!("  Type 'exit', 'quit' or 'bye' to leave.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if is_exit_command(&line) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        eprint!("  ...");
        let report = pipeline.supervisor.execute_task(&line).await;
        eprint!("\r     \r");
        println!();
        match (&report.status, &report.final_answer) {
            (TaskStatus::Completed, Some(answer)) => {
                for line in answer.trim().lines() {
                    println!("  Assistant > {line}");
                }
            }
            (TaskStatus::Completed, None) => println!("  Assistant > (no answer)"),
            (TaskStatus::Aborted { stage, error }, _) => {
                eprintln!("  [Error in {stage}] {error}");
            }
        }
        println!();
    }

    pipeline.shutdown().await;
    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_words_are_case_insensitive() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("  QUIT \n"));
        assert!(is_exit_command("Bye"));
        assert!(!is_exit_command("goodbye"));
        assert!(!is_exit_command("exit now"));
    }
}
