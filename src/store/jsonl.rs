use crate::error::StoreError;
use crate::restore::mapping::columns;
use crate::store::RecordStore;
use crate::types::{FieldSet, FieldValue, Filter, RecordId, Table};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Record store backed by a directory holding one JSON Lines file per table
pub struct JsonlStore {
    dir: PathBuf,
    writers: HashMap<Table, File>,
    next_id: HashMap<Table, i64>,
}

fn io_error(table: Table) -> impl FnOnce(std::io::Error) -> StoreError {
    move |source| StoreError::Io { table, source }
}

impl JsonlStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open<P: AsRef<Path>>(dir: P) -> std::io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(JsonlStore {
            dir: dir.as_ref().to_path_buf(),
            writers: HashMap::new(),
            next_id: HashMap::new(),
        })
    }

    pub fn table_path(&self, table: Table) -> PathBuf {
        self.dir.join(format!("{}.jsonl", table))
    }

    fn read_rows(&self, table: Table) -> Result<Vec<FieldSet>, StoreError> {
        let path = self.table_path(table);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(table)(e)),
        };

        let mut rows = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(io_error(table))?;
            if line.trim().is_empty() {
                continue;
            }
            let row = serde_json::from_str(&line).map_err(|e| StoreError::Corrupt {
                table,
                message: e.to_string(),
            })?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Replace the table file with `rows`. The new contents are written to a
    /// temporary file in the store directory and renamed over the old one, so
    /// the table is never observed half-written.
    fn write_rows(&mut self, table: Table, rows: &[FieldSet]) -> Result<(), StoreError> {
        self.writers.remove(&table);
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_error(table))?;
        for row in rows {
            write_row(tmp.as_file_mut(), table, row)?;
        }
        tmp.as_file().sync_data().map_err(io_error(table))?;
        tmp.persist(self.table_path(table))
            .map_err(|e| io_error(table)(e.error))?;
        Ok(())
    }

    fn allocate_id(&mut self, table: Table) -> Result<RecordId, StoreError> {
        let next = match self.next_id.get(&table) {
            Some(next) => *next,
            None => {
                self.read_rows(table)?
                    .iter()
                    .filter_map(|row| row.get(columns::ID).and_then(FieldValue::as_i64))
                    .max()
                    .unwrap_or(0)
                    + 1
            }
        };
        self.next_id.insert(table, next + 1);
        Ok(RecordId(next))
    }

    fn writer(&mut self, table: Table) -> Result<&mut File, StoreError> {
        let path = self.table_path(table);
        match self.writers.entry(table) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(io_error(table))?;
                Ok(entry.insert(file))
            }
        }
    }

    /// Sync every table file opened for appending to disk.
    ///
    /// Rows are written unbuffered, so they are visible to readers as soon as
    /// `insert` returns; this only forces them onto stable storage.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        for (table, writer) in self.writers.iter_mut() {
            writer.sync_data().map_err(io_error(*table))?;
        }
        Ok(())
    }
}

fn write_row(file: &mut File, table: Table, row: &FieldSet) -> Result<(), StoreError> {
    let json = serde_json::to_string(row).map_err(|e| StoreError::Rejected {
        table,
        message: e.to_string(),
    })?;
    writeln!(file, "{}", json).map_err(io_error(table))
}

impl RecordStore for JsonlStore {
    fn delete_all(&mut self, table: Table) -> Result<usize, StoreError> {
        let removed = self.read_rows(table)?.len();
        self.write_rows(table, &[])?;
        Ok(removed)
    }

    fn insert(&mut self, table: Table, mut values: FieldSet) -> Result<Option<RecordId>, StoreError> {
        let id = self.allocate_id(table)?;
        values.insert(columns::ID.to_string(), FieldValue::from(id));
        let writer = self.writer(table)?;
        write_row(writer, table, &values)?;
        Ok(Some(id))
    }

    fn update(
        &mut self,
        table: Table,
        values: FieldSet,
        filter: &Filter,
    ) -> Result<usize, StoreError> {
        let mut rows = self.read_rows(table)?;
        let mut touched = 0;
        for row in rows.iter_mut().filter(|row| filter.matches(row)) {
            row.extend(values.clone());
            touched += 1;
        }
        if touched > 0 {
            self.write_rows(table, &rows)?;
        }
        Ok(touched)
    }

    fn query(&self, table: Table, filter: &Filter) -> Result<Vec<FieldSet>, StoreError> {
        Ok(self
            .read_rows(table)?
            .into_iter()
            .filter(|row| filter.matches(row))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Blob;

    #[test]
    fn test_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut values = FieldSet::new();
        values.insert("name".to_string(), FieldValue::from("Alice"));

        {
            let mut store = JsonlStore::open(dir.path()).unwrap();
            assert_eq!(store.insert(Table::Contacts, values.clone()).unwrap(), Some(RecordId(1)));
            store.flush().unwrap();
        }

        let mut store = JsonlStore::open(dir.path()).unwrap();
        assert_eq!(store.insert(Table::Contacts, values).unwrap(), Some(RecordId(2)));
        let rows = store.query(Table::Contacts, &Filter::All).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(dir.path().join("contacts.jsonl").exists());
    }

    #[test]
    fn test_update_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        let id = store.insert(Table::Contacts, FieldSet::new()).unwrap().unwrap();
        store.insert(Table::Contacts, FieldSet::new()).unwrap();

        let mut photo = FieldSet::new();
        photo.insert("photo".to_string(), FieldValue::Blob(Blob(vec![1, 2, 3])));
        assert_eq!(store.update(Table::Contacts, photo, &Filter::id(id)).unwrap(), 1);

        let rows = store.query(Table::Contacts, &Filter::id(id)).unwrap();
        assert_eq!(rows[0].get("photo"), Some(&FieldValue::Blob(Blob(vec![1, 2, 3]))));

        // Appends after a rewrite still land in the file.
        store.insert(Table::Contacts, FieldSet::new()).unwrap();
        assert_eq!(store.query(Table::Contacts, &Filter::All).unwrap().len(), 3);

        assert_eq!(store.delete_all(Table::Contacts).unwrap(), 3);
        assert!(store.query(Table::Contacts, &Filter::All).unwrap().is_empty());
    }

    #[test]
    fn test_update_rewrites_table_without_losing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::open(dir.path()).unwrap();
        for name in ["A", "B", "C"] {
            let mut values = FieldSet::new();
            values.insert("name".to_string(), name.into());
            store.insert(Table::Contacts, values).unwrap();
        }

        let mut display = FieldSet::new();
        display.insert("display_name".to_string(), "Bee".into());
        assert_eq!(store.update(Table::Contacts, display, &Filter::id(RecordId(2))).unwrap(), 1);

        // Appends after a rewrite land in the new file
        store.insert(Table::Contacts, FieldSet::new()).unwrap();
        store.flush().unwrap();

        let rows = store.query(Table::Contacts, &Filter::All).unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.get("name").and_then(FieldValue::as_str)).collect();
        assert_eq!(names, vec![Some("A"), Some("B"), Some("C"), None]);
        assert_eq!(rows[1].get("display_name").and_then(FieldValue::as_str), Some("Bee"));

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files, vec!["contacts.jsonl".to_string()]);
    }

    #[test]
    fn test_corrupt_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("phones.jsonl"), "{not json}\n").unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();

        let err = store.query(Table::Phones, &Filter::All).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { table: Table::Phones, .. }));
    }
}
