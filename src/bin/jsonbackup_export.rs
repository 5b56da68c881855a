//! jsonbackup-export: Write all contacts of a store to a JSON backup
//!
//! Usage:
//!   # Export ./contacts-store to ./contacts.json
//!   jsonbackup-export
//!
//!   # Export to stdout
//!   jsonbackup-export --stdout | jq '.[].name'

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use jsonbackup::{
    export_contacts, export_file, CancellationToken, JsonlStore, Notification, ProgressSink,
    DEFAULT_BACKUP_FILE,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jsonbackup-export")]
#[command(about = "Export contacts to a JSON backup", long_about = None)]
struct Args {
    /// Output file (defaults to contacts.json)
    #[arg(value_name = "FILE", conflicts_with = "stdout")]
    output: Option<PathBuf>,

    /// Directory of the record store
    #[arg(long, default_value = "contacts-store")]
    store_dir: PathBuf,

    /// Write the backup to stdout instead of a file
    #[arg(long)]
    stdout: bool,
}

/// Prints contact names to stderr as they are written
struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn notify(&mut self, notification: Notification) {
        match notification {
            Notification::Info { name } => eprintln!("{}", name),
            Notification::Error { message } => eprintln!("⚠ {}", message),
            Notification::Progress { .. } => {}
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jsonbackup=warn")),
        )
        .init();

    let args = Args::parse();

    let store = JsonlStore::open(&args.store_dir)
        .with_context(|| format!("Failed to open store at {}", args.store_dir.display()))?;

    let cancel = CancellationToken::new();
    signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.flag())
        .context("Failed to install Ctrl-C handler")?;

    let mut sink = ConsoleSink;
    let summary = if args.stdout {
        export_contacts(&store, std::io::stdout().lock(), &cancel, &mut sink)?
    } else {
        let output = args
            .output
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_FILE));
        export_file(&store, &output, &cancel, &mut sink)?
    };

    eprintln!(
        "Exported {} contacts{}",
        summary.exported,
        if summary.cancelled { ", stopped early" } else { "" }
    );

    Ok(())
}
