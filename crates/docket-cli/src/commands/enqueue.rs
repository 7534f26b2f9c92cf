//! Enqueue command - Submit a job
//!
//! Usage:
//! ```bash
//! docket enqueue emails send --params '{"to": "a@example.com"}'
//! docket enqueue emails send --attempts '{"count": 3, "delay": 1000, "strategy": "exponential"}'
//! docket enqueue billing charge --query '{"account": 42}' --delay-ms 60000
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;

use docket_queue::EnqueueOptions;

use super::{connect, open_queue, parse_json};
use crate::config::DocketConfig;

/// Arguments for the enqueue command
#[derive(Args)]
pub struct EnqueueArgs {
    /// Queue name
    queue: String,

    /// Job name, matched against worker handlers
    name: String,

    /// JSON parameters passed to the handler
    #[arg(long, default_value = "{}")]
    params: String,

    /// Higher priorities are dequeued first
    #[arg(long, allow_negative_numbers = true)]
    priority: Option<i64>,

    /// Do not run before this many milliseconds from now
    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,

    /// Retry policy, e.g. '{"count": 3, "delay": 500}'
    #[arg(long, value_name = "JSON")]
    attempts: Option<String>,

    /// Lock predicate; jobs with an equal predicate never run concurrently
    #[arg(long, value_name = "JSON")]
    query: Option<String>,

    /// Advisory run-time limit in milliseconds
    #[arg(long, value_name = "MS")]
    timeout: Option<u64>,

    /// Print only the job id
    #[arg(long)]
    raw: bool,
}

/// Run the enqueue command
pub async fn run(config: &DocketConfig, args: EnqueueArgs) -> Result<()> {
    let params = serde_json::from_str(&args.params)
        .with_context(|| format!("Invalid JSON for --params: {}", args.params))?;

    let options = EnqueueOptions {
        query: parse_json("--query", args.query.as_deref())?,
        attempts: parse_json("--attempts", args.attempts.as_deref())?,
        timeout: args.timeout.map(serde_json::Value::from),
        delay: args
            .delay_ms
            .map(|ms| Utc::now() + chrono::Duration::milliseconds(ms as i64)),
        priority: args.priority,
    };

    let db = connect(config).await?;
    let queue = open_queue(&db, config, &args.queue).await?;
    let job = queue
        .enqueue(args.name.as_str(), params, options)
        .await
        .with_context(|| format!("Failed to enqueue '{}'", args.name))?;

    if args.raw {
        println!("{}", job.id());
    } else {
        crate::print_success(&format!(
            "Enqueued {} on {} as {}",
            args.name.green(),
            args.queue.cyan(),
            job.id().to_string().bold()
        ));
    }

    db.close().await;
    Ok(())
}
