//! Get command - Show a job by id
//!
//! Usage:
//! ```bash
//! docket get emails 0192f4c1-8d3e-7c4a-9b1e-2f6d5a7c9e01
//! docket get emails 0192f4c1-8d3e-7c4a-9b1e-2f6d5a7c9e01 --raw
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use uuid::Uuid;

use docket_queue::{JobDocument, JobStatus};

use super::{connect, open_queue};
use crate::config::DocketConfig;

/// Arguments for the get command
#[derive(Args)]
pub struct GetArgs {
    /// Queue name
    queue: String,

    /// Job id
    id: Uuid,

    /// Output raw JSON (no formatting)
    #[arg(long)]
    raw: bool,
}

/// Run the get command
pub async fn run(config: &DocketConfig, args: GetArgs) -> Result<()> {
    let db = connect(config).await?;
    let queue = open_queue(&db, config, &args.queue).await?;
    let job = queue.get(args.id).await?;
    db.close().await;

    let Some(job) = job else {
        anyhow::bail!("Job {} not found in queue '{}'", args.id, args.queue);
    };

    if args.raw {
        println!("{}", serde_json::to_string_pretty(job.data())?);
    } else {
        print_job(job.data())?;
    }
    Ok(())
}

fn print_job(doc: &JobDocument) -> Result<()> {
    let status = match doc.status {
        JobStatus::Queued => doc.status.as_str().yellow(),
        JobStatus::Dequeued => doc.status.as_str().blue(),
        JobStatus::Completed => doc.status.as_str().green(),
        JobStatus::Failed => doc.status.as_str().red(),
    };

    println!("{} {}", "Job".bold().cyan(), doc.id.to_string().bold());
    println!("{}", "═".repeat(50).cyan());
    println!("  {} {}", "Name:".dimmed(), doc.name.green());
    println!("  {} {}", "Queue:".dimmed(), doc.queue);
    println!("  {} {}", "Status:".dimmed(), status);
    println!("  {} {}", "Priority:".dimmed(), doc.priority);
    println!("  {} {}", "Enqueued:".dimmed(), doc.enqueued.to_rfc3339());
    println!("  {} {}", "Not before:".dimmed(), doc.delay.to_rfc3339());
    if let Some(at) = doc.dequeued {
        println!("  {} {}", "Dequeued:".dimmed(), at.to_rfc3339());
    }
    if let Some(at) = doc.completed {
        println!("  {} {}", "Completed:".dimmed(), at.to_rfc3339());
    }
    if let Some(at) = doc.failed {
        println!("  {} {}", "Failed:".dimmed(), at.to_rfc3339());
    }
    println!(
        "  {} {} (remaining: {})",
        "Attempts:".dimmed(),
        doc.attempts.count,
        doc.attempts
            .remaining
            .map_or_else(|| "-".to_string(), |r| r.to_string())
    );
    if let Some(query) = &doc.query {
        println!("  {} {}", "Lock:".dimmed(), query);
    }
    if let Some(error) = &doc.error {
        println!("  {} {}", "Error:".dimmed(), error.red());
    }
    println!();

    println!("{}", "Params:".bold());
    println!("{}", serde_json::to_string_pretty(&doc.params)?);
    if let Some(result) = &doc.result {
        println!("{}", "Result:".bold());
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    Ok(())
}
