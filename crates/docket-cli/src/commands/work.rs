//! Work command - Run a worker until interrupted
//!
//! Usage:
//! ```bash
//! docket work emails
//! docket work emails reports --interval-ms 1000 --min-priority 1
//! ```
//!
//! The worker ships a single `echo` handler, which completes a job with its
//! own params. Ctrl-C stops polling and waits for the job in flight.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;

use docket_queue::{BoxError, EventKind, Worker, WorkerConfig, WorkerEvent};

use super::{connect, open_queue};
use crate::config::DocketConfig;

/// Arguments for the work command
#[derive(Args)]
pub struct WorkArgs {
    /// Queues to poll, in rotation order
    #[arg(required = true, num_args = 1..)]
    queues: Vec<String>,

    /// Wait after an empty rotation [default: $DOCKET_INTERVAL_MS or 5000]
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Only claim jobs at or above this priority
    #[arg(long, allow_negative_numbers = true)]
    min_priority: Option<i64>,
}

/// Run the work command
pub async fn run(config: &DocketConfig, args: WorkArgs) -> Result<()> {
    let db = connect(config).await?;
    let mut queues = Vec::with_capacity(args.queues.len());
    for name in &args.queues {
        queues.push(open_queue(&db, config, name).await?);
    }

    let mut worker_config = WorkerConfig::default().with_interval(
        args.interval_ms
            .map(Duration::from_millis)
            .unwrap_or(config.interval),
    );
    if let Some(min) = args.min_priority {
        worker_config = worker_config.with_min_priority(min);
    }

    let worker = Arc::new(Worker::new(queues, worker_config));
    worker.register_fn("echo", |params| async move { Ok::<_, BoxError>(params) });
    report_events(&worker);

    worker.start().await.context("Failed to start worker")?;
    crate::print_info(&format!(
        "Working {} every {}ms (Ctrl-C to stop)",
        args.queues.join(", ").cyan(),
        worker.interval().as_millis()
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    crate::print_info("Stopping, waiting for the current job...");
    worker.stop().await;
    db.close().await;
    crate::print_success("Worker stopped");
    Ok(())
}

fn report_events(worker: &Worker) {
    worker.on(EventKind::Complete, |event| {
        if let Some(job) = event.job() {
            crate::print_success(&format!("{} {} completed", job.name.green(), job.id));
        }
    });
    worker.on(EventKind::Failed, |event| {
        if let Some(job) = event.job() {
            let error = job.error.as_deref().unwrap_or("unknown error");
            if job.status == docket_queue::JobStatus::Queued {
                crate::print_warning(&format!(
                    "{} {} failed, retrying: {}",
                    job.name.yellow(),
                    job.id,
                    error
                ));
            } else {
                crate::print_error(&format!("{} {} failed: {}", job.name.red(), job.id, error));
            }
        }
    });
    worker.on(EventKind::Error, |event| {
        if let WorkerEvent::Error(e) = event {
            crate::print_error(&format!("Worker error: {e}"));
        }
    });
}
