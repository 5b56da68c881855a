use crate::error::StoreError;
use crate::store::{PendingWrite, RecordStore, WriteOutcome};
use crate::types::WriteMode;

/// Counts of child writes for one contact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteTally {
    pub written: usize,
    pub failed: usize,
}

impl WriteTally {
    fn record(&mut self, table: &str, result: Result<WriteOutcome, StoreError>) {
        match result {
            Ok(WriteOutcome::Inserted(_)) => self.written += 1,
            Ok(WriteOutcome::Updated(n)) if n > 0 => self.written += 1,
            Ok(outcome) => {
                self.failed += 1;
                tracing::debug!(table, ?outcome, "child write had no effect");
            }
            Err(e) => {
                self.failed += 1;
                tracing::warn!(table, error = %e, "child write failed");
            }
        }
    }
}

/// Write strategy for the rows that hang off a core record.
///
/// Failures are best-effort: they are logged and counted, never surfaced.
pub trait ChildWriter {
    fn write(&mut self, store: &mut dyn RecordStore, write: PendingWrite);

    /// Push out anything still held back and return the tally
    fn finish(&mut self, store: &mut dyn RecordStore) -> WriteTally;
}

impl WriteMode {
    pub fn writer(self) -> Box<dyn ChildWriter> {
        match self {
            WriteMode::Immediate => Box::new(ImmediateWriter::default()),
            WriteMode::Batched => Box::new(BatchWriter::default()),
        }
    }
}

/// Writes every child as soon as it is mapped
#[derive(Debug, Default)]
pub struct ImmediateWriter {
    tally: WriteTally,
}

impl ChildWriter for ImmediateWriter {
    fn write(&mut self, store: &mut dyn RecordStore, write: PendingWrite) {
        let table = write.table();
        let mut results = store.apply_batch(vec![write]);
        if let Some(result) = results.pop() {
            self.tally.record(table.as_str(), result);
        }
    }

    fn finish(&mut self, _store: &mut dyn RecordStore) -> WriteTally {
        std::mem::take(&mut self.tally)
    }
}

/// Holds children back and hands them to the store in one batch.
/// The batch is applied write by write; it is not a transaction.
#[derive(Debug, Default)]
pub struct BatchWriter {
    pending: Vec<PendingWrite>,
}

impl ChildWriter for BatchWriter {
    fn write(&mut self, _store: &mut dyn RecordStore, write: PendingWrite) {
        self.pending.push(write);
    }

    fn finish(&mut self, store: &mut dyn RecordStore) -> WriteTally {
        let writes = std::mem::take(&mut self.pending);
        let tables: Vec<_> = writes.iter().map(PendingWrite::table).collect();

        let mut tally = WriteTally::default();
        for (table, result) in tables.into_iter().zip(store.apply_batch(writes)) {
            tally.record(table.as_str(), result);
        }
        tally
    }
}
