use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Default name of the backup file, relative to the storage folder
pub const DEFAULT_BACKUP_FILE: &str = "contacts.json";

/// Identifier generated by a record store for a freshly inserted row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The tables (URI families) a contact is spread across
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Contacts,
    Phones,
    ContactMethods,
    Organizations,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Contacts,
        Table::Phones,
        Table::ContactMethods,
        Table::Organizations,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Table::Contacts => "contacts",
            Table::Phones => "phones",
            Table::ContactMethods => "contact_methods",
            Table::Organizations => "organizations",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary column payload. Serialized as `{"base64": "..."}` so it never
/// collides with a text value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob(pub Vec<u8>);

#[derive(Serialize, Deserialize)]
struct BlobRepr {
    base64: String,
}

impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        BlobRepr {
            base64: STANDARD.encode(&self.0),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Blob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = BlobRepr::deserialize(deserializer)?;
        STANDARD
            .decode(repr.base64)
            .map(Blob)
            .map_err(serde::de::Error::custom)
    }
}

/// A single column value. Booleans are stored as integers 0/1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    Blob(Blob),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Integer(i64::from(b))
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<RecordId> for FieldValue {
    fn from(id: RecordId) -> Self {
        FieldValue::Integer(id.0)
    }
}

/// Column name to value, the unit of every store write
pub type FieldSet = BTreeMap<String, FieldValue>;

/// Row selector for updates and queries
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Eq(String, FieldValue),
}

impl Filter {
    pub fn id(id: RecordId) -> Self {
        Filter::Eq(crate::restore::mapping::columns::ID.to_string(), id.into())
    }

    pub fn matches(&self, row: &FieldSet) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(column, value) => row.get(column) == Some(value),
        }
    }
}

/// How child rows of one contact reach the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Each child row is inserted as soon as it is mapped
    #[default]
    Immediate,
    /// Child rows are collected and handed to the store as one batch
    Batched,
}

/// Lifecycle of a restore operation. `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreState {
    Running,
    Done,
}

/// Configuration for the restore process
#[derive(Debug, Clone)]
pub struct RestoreConfig {
    /// Emit a progress notification every this many bytes consumed
    pub progress_interval: u64,

    /// Title stored for organizations whose title is missing or empty
    pub missing_title: String,

    /// Write strategy for child rows
    pub write_mode: WriteMode,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        RestoreConfig {
            progress_interval: 100,
            missing_title: String::from("N/A"),
            write_mode: WriteMode::Immediate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_serialization_is_unambiguous() {
        let mut row = FieldSet::new();
        row.insert("n".to_string(), FieldValue::Integer(7));
        row.insert("t".to_string(), FieldValue::from("7"));
        row.insert("b".to_string(), FieldValue::Blob(Blob(vec![0xff, 0x00, 0x10])));

        let json = serde_json::to_string(&row).unwrap();
        let back: FieldSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn test_filter_matches_by_column() {
        let mut row = FieldSet::new();
        row.insert("_id".to_string(), FieldValue::Integer(3));

        assert!(Filter::All.matches(&row));
        assert!(Filter::id(RecordId(3)).matches(&row));
        assert!(!Filter::id(RecordId(4)).matches(&row));
    }
}
