use crate::error::StoreError;
use crate::restore::mapping::columns;
use crate::store::RecordStore;
use crate::types::{FieldSet, FieldValue, Filter, RecordId, Table};
use std::collections::BTreeMap;

type RefusalRule = Box<dyn Fn(Table, &FieldSet) -> bool + Send>;

/// In-memory record store. Every table assigns its own ascending `_id`.
#[derive(Default)]
pub struct MemoryStore {
    tables: BTreeMap<Table, Vec<FieldSet>>,
    next_id: BTreeMap<Table, i64>,
    refuse: Option<RefusalRule>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `insert` return `Ok(None)` for rows matching `rule`
    pub fn refuse_if(mut self, rule: impl Fn(Table, &FieldSet) -> bool + Send + 'static) -> Self {
        self.refuse = Some(Box::new(rule));
        self
    }

    pub fn rows(&self, table: Table) -> &[FieldSet] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self, table: Table) -> usize {
        self.rows(table).len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(Vec::is_empty)
    }
}

impl RecordStore for MemoryStore {
    fn delete_all(&mut self, table: Table) -> Result<usize, StoreError> {
        Ok(self.tables.remove(&table).map_or(0, |rows| rows.len()))
    }

    fn insert(&mut self, table: Table, mut values: FieldSet) -> Result<Option<RecordId>, StoreError> {
        if self.refuse.as_ref().is_some_and(|rule| rule(table, &values)) {
            return Ok(None);
        }

        let next = self.next_id.entry(table).or_insert(1);
        let id = RecordId(*next);
        *next += 1;

        values.insert(columns::ID.to_string(), FieldValue::from(id));
        self.tables.entry(table).or_default().push(values);
        Ok(Some(id))
    }

    fn update(
        &mut self,
        table: Table,
        values: FieldSet,
        filter: &Filter,
    ) -> Result<usize, StoreError> {
        let mut touched = 0;
        for row in self.tables.entry(table).or_default().iter_mut() {
            if filter.matches(row) {
                row.extend(values.clone());
                touched += 1;
            }
        }
        Ok(touched)
    }

    fn query(&self, table: Table, filter: &Filter) -> Result<Vec<FieldSet>, StoreError> {
        Ok(self
            .rows(table)
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, FieldValue)]) -> FieldSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_insert_assigns_ids_per_table() {
        let mut store = MemoryStore::new();
        let a = store.insert(Table::Contacts, FieldSet::new()).unwrap();
        let b = store.insert(Table::Contacts, FieldSet::new()).unwrap();
        let p = store.insert(Table::Phones, FieldSet::new()).unwrap();

        assert_eq!(a, Some(RecordId(1)));
        assert_eq!(b, Some(RecordId(2)));
        assert_eq!(p, Some(RecordId(1)));
    }

    #[test]
    fn test_update_by_filter_merges_columns() {
        let mut store = MemoryStore::new();
        let id = store
            .insert(Table::Contacts, row(&[("name", "A".into())]))
            .unwrap()
            .unwrap();
        store.insert(Table::Contacts, row(&[("name", "B".into())])).unwrap();

        let touched = store
            .update(Table::Contacts, row(&[("notes", "n".into())]), &Filter::id(id))
            .unwrap();

        assert_eq!(touched, 1);
        let rows = store.query(Table::Contacts, &Filter::id(id)).unwrap();
        assert_eq!(rows[0].get("notes"), Some(&FieldValue::from("n")));
        assert_eq!(rows[0].get("name"), Some(&FieldValue::from("A")));
    }

    #[test]
    fn test_refusal_rule() {
        let mut store = MemoryStore::new().refuse_if(|table, _| table == Table::Contacts);
        assert_eq!(store.insert(Table::Contacts, FieldSet::new()).unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_all_counts_rows() {
        let mut store = MemoryStore::new();
        store.insert(Table::Phones, FieldSet::new()).unwrap();
        store.insert(Table::Phones, FieldSet::new()).unwrap();

        assert_eq!(store.delete_all(Table::Phones).unwrap(), 2);
        assert_eq!(store.len(Table::Phones), 0);
    }
}
