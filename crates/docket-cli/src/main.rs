//! Docket CLI - enqueue, inspect and work jobs in a SQLite-backed queue
//!
//! # Usage
//!
//! ```bash
//! # Submit a job
//! docket enqueue emails send --params '{"to": "a@example.com"}' --priority 2
//!
//! # Look a job up
//! docket get emails 0192f4c1-8d3e-7c4a-9b1e-2f6d5a7c9e01
//!
//! # Per-status counts
//! docket stats emails
//!
//! # Run a worker until Ctrl-C
//! docket work emails reports --interval-ms 1000
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;
mod config;

use commands::{enqueue, get, stats, work};
use config::DocketConfig;

/// Docket - a persistent job queue shared by independent workers
#[derive(Parser)]
#[command(
    name = "docket",
    version,
    about = "Docket CLI - persistent multi-worker job queue",
    long_about = "Docket stores jobs in a shared SQLite database.\n\n\
                  Any number of worker processes may poll the same database;\n\
                  each job is claimed by exactly one of them."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Database URL [default: $DOCKET_DATABASE_URL or sqlite:docket.db?mode=rwc]
    #[arg(long, global = true, value_name = "URL")]
    database: Option<String>,

    /// Collection (table) holding the jobs [default: $DOCKET_COLLECTION or jobs]
    #[arg(long, global = true, value_name = "NAME")]
    collection: Option<String>,

    /// Let queues see jobs of every queue name in the collection
    #[arg(long, global = true)]
    universal: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job
    #[command(name = "enqueue")]
    Enqueue(enqueue::EnqueueArgs),

    /// Show a job by id
    #[command(name = "get")]
    Get(get::GetArgs),

    /// Count a queue's jobs by status
    #[command(name = "stats")]
    Stats(stats::StatsArgs),

    /// Run a worker over one or more queues
    #[command(name = "work")]
    Work(work::WorkArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    setup_logging(cli.verbose);

    // Environment first, flags on top
    let mut config = DocketConfig::from_env()?;
    if let Some(url) = cli.database {
        config.database_url = url;
    }
    if let Some(collection) = cli.collection {
        config.collection = collection;
    }
    if cli.universal {
        config.universal = true;
    }

    match cli.command {
        Commands::Enqueue(args) => enqueue::run(&config, args).await,
        Commands::Get(args) => get::run(&config, args).await,
        Commands::Stats(args) => stats::run(&config, args).await,
        Commands::Work(args) => work::run(&config, args).await,
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();
}

/// Print a success message with a checkmark
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message with an X
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}

/// Print an info message
pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}
