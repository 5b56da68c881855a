//! jsonbackup-restore: Replace all contacts in a store with a JSON backup
//!
//! The backup is streamed; contacts are committed one by one as they are
//! read. Ctrl-C stops after the contact currently being written.
//!
//! Usage:
//!   # Restore ./contacts.json into ./contacts-store
//!   jsonbackup-restore
//!
//!   # Restore a specific file into a specific store, batching child rows
//!   jsonbackup-restore backup.json --store-dir /var/lib/contacts --batched

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use jsonbackup::{
    JsonlStore, Notification, RestoreConfig, RestoreWorker, WriteMode, DEFAULT_BACKUP_FILE,
};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jsonbackup-restore")]
#[command(about = "Restore contacts from a streamed JSON backup", long_about = None)]
struct Args {
    /// Backup file (defaults to contacts.json)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Directory of the record store
    #[arg(long, default_value = "contacts-store")]
    store_dir: PathBuf,

    /// Collect child rows of each contact and write them as one batch
    #[arg(long)]
    batched: bool,

    /// Report progress every N bytes (default: 100)
    #[arg(long)]
    progress_interval: Option<u64>,

    /// Title stored for organizations without one (default: "N/A")
    #[arg(long)]
    missing_title: Option<String>,

    /// Don't print restored contact names
    #[arg(long, short = 'q')]
    quiet: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jsonbackup=warn")),
        )
        .init();

    let args = Args::parse();

    let mut config = RestoreConfig::default();
    if let Some(interval) = args.progress_interval {
        config.progress_interval = interval;
    }
    if let Some(title) = args.missing_title {
        config.missing_title = title;
    }
    if args.batched {
        config.write_mode = WriteMode::Batched;
    }

    let input = args
        .input
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_FILE));
    let store = JsonlStore::open(&args.store_dir)
        .with_context(|| format!("Failed to open store at {}", args.store_dir.display()))?;

    let worker = RestoreWorker::spawn(store, input, config).context("Failed to start restore")?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, worker.cancellation_token().flag())
        .context("Failed to install Ctrl-C handler")?;

    let mut stderr = std::io::stderr();
    let mut errors = 0usize;
    for notification in worker.notifications().iter() {
        match notification {
            Notification::Info { name } => {
                if !args.quiet {
                    println!("{}", name);
                }
            }
            Notification::Progress { position, total } => {
                let percent = if total == 0 { 100 } else { position * 100 / total };
                write!(stderr, "\r{:>3}% ({}/{} bytes)", percent, position, total)?;
                if position == total {
                    writeln!(stderr)?;
                }
            }
            Notification::Error { message } => {
                errors += 1;
                writeln!(stderr, "\n⚠ {}", message)?;
            }
        }
    }

    let (mut store, result) = worker
        .join()
        .map_err(|_| anyhow!("restore worker panicked"))?;
    store.flush()?;
    let summary = result?;

    eprintln!(
        "Restored {} contacts ({} skipped, {} errors){}",
        summary.restored,
        summary.skipped,
        errors,
        if summary.cancelled { ", stopped early" } else { "" }
    );

    Ok(())
}
