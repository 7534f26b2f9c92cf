//! Stats command - Count a queue's jobs by status
//!
//! Usage:
//! ```bash
//! docket stats emails
//! docket stats emails --raw
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use super::{connect, open_queue};
use crate::config::DocketConfig;

/// Arguments for the stats command
#[derive(Args)]
pub struct StatsArgs {
    /// Queue names
    #[arg(required = true, num_args = 1..)]
    queues: Vec<String>,

    /// Output raw JSON (no formatting)
    #[arg(long)]
    raw: bool,
}

/// Run the stats command
pub async fn run(config: &DocketConfig, args: StatsArgs) -> Result<()> {
    let db = connect(config).await?;

    let mut rows = Vec::with_capacity(args.queues.len());
    for name in &args.queues {
        let queue = open_queue(&db, config, name).await?;
        rows.push((name.clone(), queue.stats().await?));
    }
    db.close().await;

    if args.raw {
        let map: serde_json::Map<String, serde_json::Value> = rows
            .into_iter()
            .map(|(name, stats)| Ok((name, serde_json::to_value(stats)?)))
            .collect::<Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    println!("{}", "Queue statistics".bold().cyan());
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Queue").fg(Color::Cyan),
            Cell::new("Queued").fg(Color::Cyan),
            Cell::new("Dequeued").fg(Color::Cyan),
            Cell::new("Completed").fg(Color::Cyan),
            Cell::new("Failed").fg(Color::Cyan),
        ]);

    for (name, stats) in rows {
        table.add_row(vec![
            Cell::new(name).fg(Color::Green),
            Cell::new(stats.queued).fg(Color::Yellow),
            Cell::new(stats.dequeued).fg(Color::Blue),
            Cell::new(stats.completed).fg(Color::Green),
            Cell::new(stats.failed).fg(Color::Red),
        ]);
    }

    println!("{table}");
    Ok(())
}
