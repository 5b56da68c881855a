//! # jsonbackup - Streaming contact backup and restore
//!
//! Restores personal contacts from a JSON backup into a relational record
//! store, and exports them back out. The backup is streamed: contacts are
//! cut out of the input one top-level object at a time, parsed, and written
//! before the next one is read, so memory use does not grow with the file.
//!
//! ## Modules
//!
//! - **scan**: Boundary scanner splitting a byte stream into object fragments
//! - **restore**: Field mapping, contact materializer and the restore worker
//! - **store**: The record store interface plus in-memory and JSON Lines stores
//! - **export**: Store to JSON backup
//!
//! ## Quick Start
//!
//! ```rust
//! use jsonbackup::{restore_stream, CancellationToken, MemoryStore, RestoreConfig, Table};
//! use std::io::Cursor;
//!
//! # fn main() -> anyhow::Result<()> {
//! let backup = r#"[{"name": "Doe,John", "phonenumbers": [{"type": 2, "number": "555-0100"}]}]"#;
//!
//! let mut store = MemoryStore::new();
//! let mut notifications: Vec<jsonbackup::Notification> = Vec::new();
//! let summary = restore_stream(
//!     &mut store,
//!     Cursor::new(backup),
//!     backup.len() as u64,
//!     &RestoreConfig::default(),
//!     &CancellationToken::new(),
//!     &mut notifications,
//! )?;
//!
//! assert_eq!(summary.restored, 1);
//! assert_eq!(store.len(Table::Phones), 1);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub mod error;
pub mod export;
pub mod notify;
pub mod restore;
pub mod scan;
pub mod store;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{ExportError, MaterializeError, RestoreError, ScanError, StoreError};
pub use export::{export_contacts, ExportSummary};
pub use notify::{Notification, ProgressSink};
pub use restore::{
    clear_contacts, restore_file, restore_stream, ContactMaterializer, RestoreSummary,
    RestoreWorker,
};
pub use scan::{BoundaryScanner, CancellationToken, Fragment, ScanEvent};
pub use store::{JsonlStore, MemoryStore, RecordStore};
pub use types::{
    FieldSet, FieldValue, Filter, RecordId, RestoreConfig, RestoreState, Table, WriteMode,
    DEFAULT_BACKUP_FILE,
};

/// Export every contact in `store` to a backup file at `path`
pub fn export_file<S, P>(
    store: &S,
    path: &Path,
    cancel: &CancellationToken,
    sink: &mut P,
) -> Result<ExportSummary>
where
    S: RecordStore + ?Sized,
    P: ProgressSink,
{
    let file = File::create(path)
        .with_context(|| format!("Failed to create backup file: {}", path.display()))?;
    export_contacts(store, BufWriter::new(file), cancel, sink)
        .with_context(|| format!("Failed to export contacts to {}", path.display()))
}
