use crate::types::Table;
use thiserror::Error;

/// Failures raised by a record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on table {table}: {source}")]
    Io {
        table: Table,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt row in table {table}: {message}")]
    Corrupt { table: Table, message: String },

    #[error("Store rejected write to {table}: {message}")]
    Rejected { table: Table, message: String },
}

/// Failures raised while scanning the backup stream
#[derive(Debug, Error)]
pub enum ScanError {
    /// The underlying reader failed; scanning cannot continue.
    #[error("Failed to read backup stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("Contact at byte {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: u64 },

    #[error("Contact at byte {offset} is not terminated before end of input")]
    Unterminated { offset: u64 },
}

impl ScanError {
    /// Whether scanning stops after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::Io(_))
    }
}

/// Failures that end a restore operation as a whole
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("Failed to open backup file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures that skip a single contact
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("Failed to create contact for {name}")]
    Refused { name: String },

    #[error("Failed to create contact for {name}: {source}")]
    Store {
        name: String,
        #[source]
        source: StoreError,
    },
}

/// Failures while writing a backup file
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to write backup: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode contact: {0}")]
    Json(#[from] serde_json::Error),
}
