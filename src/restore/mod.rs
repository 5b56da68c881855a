//! Contact restore - rebuild contacts from a streamed JSON backup
//!
//! The boundary scanner hands out one object per contact; each is parsed and
//! mapped onto the record store through a single canonical mapping table.
//! How child rows reach the store (immediately or batched) is pluggable.

pub mod mapping;
pub mod materializer;
pub mod pipeline;
pub mod writer;

pub use mapping::{FieldKind, FieldMapping};
pub use materializer::{ContactMaterializer, MaterializedContact};
pub use pipeline::{clear_contacts, restore_file, restore_stream, RestoreSummary, RestoreWorker};
pub use writer::{BatchWriter, ChildWriter, ImmediateWriter, WriteTally};
