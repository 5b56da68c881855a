//! Record store abstraction
//!
//! Contacts are restored into a relational sink made of a core table and
//! child tables linked by foreign key. The pipeline only ever deletes,
//! inserts and updates-by-filter; `query` exists for export.

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::types::{FieldSet, Filter, RecordId, Table};

/// A single deferred write
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    Insert { table: Table, values: FieldSet },
    Update { table: Table, values: FieldSet, filter: Filter },
}

impl PendingWrite {
    pub fn table(&self) -> Table {
        match self {
            PendingWrite::Insert { table, .. } | PendingWrite::Update { table, .. } => *table,
        }
    }
}

/// Outcome of one write inside a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted(RecordId),
    Refused,
    Updated(usize),
}

pub trait RecordStore {
    /// Remove every row of `table`, returning how many were removed
    fn delete_all(&mut self, table: Table) -> Result<usize, StoreError>;

    /// Insert a row. `Ok(None)` means the store refused it without failing.
    fn insert(&mut self, table: Table, values: FieldSet) -> Result<Option<RecordId>, StoreError>;

    /// Merge `values` into every row matching `filter`
    fn update(&mut self, table: Table, values: FieldSet, filter: &Filter)
        -> Result<usize, StoreError>;

    fn query(&self, table: Table, filter: &Filter) -> Result<Vec<FieldSet>, StoreError>;

    /// Apply writes in order. Each write stands alone: a failure does not
    /// undo earlier writes nor prevent later ones.
    fn apply_batch(&mut self, writes: Vec<PendingWrite>) -> Vec<Result<WriteOutcome, StoreError>> {
        writes
            .into_iter()
            .map(|write| match write {
                PendingWrite::Insert { table, values } => self
                    .insert(table, values)
                    .map(|id| id.map_or(WriteOutcome::Refused, WriteOutcome::Inserted)),
                PendingWrite::Update {
                    table,
                    values,
                    filter,
                } => self.update(table, values, &filter).map(WriteOutcome::Updated),
            })
            .collect()
    }
}
