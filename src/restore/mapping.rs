//! Canonical field mapping between the backup format and store columns
//!
//! One table per entity. Restore reads `key` from the JSON object and writes
//! `column`; export goes the other way. Every mapping is optional: a missing
//! or mistyped source value only drops that column.

use crate::types::{FieldSet, FieldValue};
use serde_json::{Map, Value};

/// JSON keys of the backup format
pub mod keys {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const DISPLAY_NAME: &str = "display_name";
    pub const TIMES_CONTACTED: &str = "times_contacted";
    pub const STARRED: &str = "starred";
    pub const NOTES: &str = "notes";
    pub const CUSTOM_RINGTONE: &str = "custom_ringtone";
    pub const LAST_TIME_CONTACTED: &str = "last_time_contacted";
    pub const PHONETIC_NAME: &str = "phonetic_name";
    pub const PHOTO_VERSION: &str = "photo_version";
    pub const SEND_TO_VOICEMAIL: &str = "send_to_voicemail";

    pub const PHONE_NUMBERS: &str = "phonenumbers";
    pub const CONTACT_METHODS: &str = "contact_methods";
    pub const ORGANIZATIONS: &str = "organizations";
    pub const PHOTOS: &str = "photos";

    pub const TYPE: &str = "type";
    pub const NUMBER: &str = "number";
    pub const IS_PRIMARY: &str = "isprimary";
    pub const LABEL: &str = "label";
    pub const NUMBER_KEY: &str = "number_key";

    pub const KIND: &str = "kind";
    pub const DATA: &str = "data";
    pub const AUX_DATA: &str = "aux_data";

    pub const COMPANY: &str = "company";
    pub const TITLE: &str = "title";
}

/// Store column names
pub mod columns {
    pub const ID: &str = "_id";
    pub const SOURCE_ID: &str = "source_id";
    pub const NAME: &str = "name";
    pub const DISPLAY_NAME: &str = "display_name";
    pub const TIMES_CONTACTED: &str = "times_contacted";
    pub const STARRED: &str = "starred";
    pub const NOTES: &str = "notes";
    pub const CUSTOM_RINGTONE: &str = "custom_ringtone";
    pub const LAST_TIME_CONTACTED: &str = "last_time_contacted";
    pub const PHONETIC_NAME: &str = "phonetic_name";
    pub const PHOTO_VERSION: &str = "photo_version";
    pub const SEND_TO_VOICEMAIL: &str = "send_to_voicemail";
    pub const PHOTO: &str = "photo";

    /// Foreign key of phones and contact methods
    pub const PERSON: &str = "person";
    /// Foreign key of organizations; must equal the contact `_id`
    pub const RAW_CONTACT_ID: &str = "raw_contact_id";

    pub const TYPE: &str = "type";
    pub const NUMBER: &str = "number";
    pub const IS_PRIMARY: &str = "isprimary";
    pub const LABEL: &str = "label";
    pub const NUMBER_KEY: &str = "number_key";
    pub const KIND: &str = "kind";
    pub const DATA: &str = "data";
    pub const AUX_DATA: &str = "aux_data";
    pub const COMPANY: &str = "company";
    pub const TITLE: &str = "title";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    /// Stored as 0/1
    Boolean,
}

impl FieldKind {
    /// Lenient conversion of a JSON value into a column value
    pub fn extract(self, value: &Value) -> Option<FieldValue> {
        match (self, value) {
            (FieldKind::Text, Value::String(s)) => Some(FieldValue::Text(s.clone())),
            (FieldKind::Text, Value::Number(n)) => Some(FieldValue::Text(n.to_string())),
            (FieldKind::Text, Value::Bool(b)) => Some(FieldValue::Text(b.to_string())),

            (FieldKind::Integer, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite() && f.fract() == 0.0).map(|f| f as i64))
                .map(FieldValue::Integer),
            (FieldKind::Integer, Value::String(s)) => s.trim().parse().ok().map(FieldValue::Integer),

            (FieldKind::Boolean, Value::Bool(b)) => Some(FieldValue::from(*b)),
            (FieldKind::Boolean, Value::Number(n)) => match n.as_i64() {
                Some(flag @ (0 | 1)) => Some(FieldValue::Integer(flag)),
                _ => None,
            },
            (FieldKind::Boolean, Value::String(s)) => {
                if s.eq_ignore_ascii_case("true") {
                    Some(FieldValue::from(true))
                } else if s.eq_ignore_ascii_case("false") {
                    Some(FieldValue::from(false))
                } else {
                    None
                }
            }

            _ => None,
        }
    }

    /// Convert a stored column value back into its backup representation
    pub fn to_json(self, value: &FieldValue) -> Option<Value> {
        match (self, value) {
            (FieldKind::Text, FieldValue::Text(s)) => Some(Value::String(s.clone())),
            (FieldKind::Text, FieldValue::Integer(n)) => Some(Value::String(n.to_string())),
            (FieldKind::Integer, FieldValue::Integer(n)) => Some(Value::from(*n)),
            (FieldKind::Boolean, FieldValue::Integer(n)) => Some(Value::Bool(*n != 0)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub key: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

const fn field(key: &'static str, column: &'static str, kind: FieldKind) -> FieldMapping {
    FieldMapping { key, column, kind }
}

/// Core record columns. `name` and `id` are handled separately.
pub const CONTACT_FIELDS: &[FieldMapping] = &[
    field(keys::TIMES_CONTACTED, columns::TIMES_CONTACTED, FieldKind::Integer),
    field(keys::STARRED, columns::STARRED, FieldKind::Integer),
    field(keys::NOTES, columns::NOTES, FieldKind::Text),
    field(keys::CUSTOM_RINGTONE, columns::CUSTOM_RINGTONE, FieldKind::Text),
    field(keys::LAST_TIME_CONTACTED, columns::LAST_TIME_CONTACTED, FieldKind::Integer),
    field(keys::PHONETIC_NAME, columns::PHONETIC_NAME, FieldKind::Text),
    field(keys::PHOTO_VERSION, columns::PHOTO_VERSION, FieldKind::Text),
    field(keys::SEND_TO_VOICEMAIL, columns::SEND_TO_VOICEMAIL, FieldKind::Integer),
];

pub const PHONE_FIELDS: &[FieldMapping] = &[
    field(keys::TYPE, columns::TYPE, FieldKind::Integer),
    field(keys::NUMBER, columns::NUMBER, FieldKind::Text),
    field(keys::IS_PRIMARY, columns::IS_PRIMARY, FieldKind::Boolean),
    field(keys::LABEL, columns::LABEL, FieldKind::Text),
    field(keys::NUMBER_KEY, columns::NUMBER_KEY, FieldKind::Text),
];

pub const CONTACT_METHOD_FIELDS: &[FieldMapping] = &[
    field(keys::KIND, columns::KIND, FieldKind::Text),
    field(keys::DATA, columns::DATA, FieldKind::Text),
    field(keys::TYPE, columns::TYPE, FieldKind::Integer),
    field(keys::IS_PRIMARY, columns::IS_PRIMARY, FieldKind::Boolean),
    field(keys::AUX_DATA, columns::AUX_DATA, FieldKind::Text),
    field(keys::LABEL, columns::LABEL, FieldKind::Text),
];

/// Organization columns except `title`, which gets a sentinel when empty
pub const ORGANIZATION_FIELDS: &[FieldMapping] = &[
    field(keys::COMPANY, columns::COMPANY, FieldKind::Text),
    field(keys::LABEL, columns::LABEL, FieldKind::Text),
    field(keys::TYPE, columns::TYPE, FieldKind::Integer),
    field(keys::IS_PRIMARY, columns::IS_PRIMARY, FieldKind::Boolean),
];

/// Build a field set from `source`, skipping absent or mistyped values
pub fn map_fields(source: &Map<String, Value>, mappings: &[FieldMapping]) -> FieldSet {
    mappings
        .iter()
        .filter_map(|m| {
            let value = m.kind.extract(source.get(m.key)?)?;
            Some((m.column.to_string(), value))
        })
        .collect()
}

/// Inverse of [`map_fields`]
pub fn unmap_fields(row: &FieldSet, mappings: &[FieldMapping]) -> Map<String, Value> {
    mappings
        .iter()
        .filter_map(|m| {
            let value = m.kind.to_json(row.get(m.column)?)?;
            Some((m.key.to_string(), value))
        })
        .collect()
}

/// "Family,Given" becomes "Given Family"; anything without exactly one
/// comma, or with nothing after it, is kept verbatim.
pub fn normalize_name(name: &str) -> String {
    match name.split_once(',') {
        Some((family, given)) if !given.contains(',') && !given.trim().is_empty() => {
            format!("{} {}", given.trim(), family.trim())
                .trim_end()
                .to_string()
        }
        _ => name.to_string(),
    }
}
