//! Maps one parsed contact object onto the record store
//!
//! The core record goes in first; its generated id is the foreign key of
//! every child row. Nothing here is transactional: if the process dies
//! halfway, the contact stays partially populated.

use crate::error::MaterializeError;
use crate::restore::mapping::{
    self, columns, keys, FieldKind, CONTACT_FIELDS, CONTACT_METHOD_FIELDS, ORGANIZATION_FIELDS,
    PHONE_FIELDS,
};
use crate::restore::writer::WriteTally;
use crate::store::{PendingWrite, RecordStore};
use crate::types::{Blob, FieldSet, FieldValue, Filter, RecordId, RestoreConfig, Table};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};

/// What was written for one contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedContact {
    pub id: RecordId,
    pub name: String,
    pub phones: usize,
    pub contact_methods: usize,
    pub organizations: usize,
    pub photo: bool,
    pub children: WriteTally,
    /// Problems worth reporting that did not stop the contact
    pub warnings: Vec<String>,
}

pub struct ContactMaterializer {
    config: RestoreConfig,
}

impl ContactMaterializer {
    pub fn new(config: RestoreConfig) -> Self {
        ContactMaterializer { config }
    }

    pub fn config(&self) -> &RestoreConfig {
        &self.config
    }

    /// Write one contact and all of its child rows
    pub fn materialize(
        &self,
        store: &mut dyn RecordStore,
        contact: &Map<String, Value>,
    ) -> Result<MaterializedContact, MaterializeError> {
        let mut values = mapping::map_fields(contact, CONTACT_FIELDS);

        if let Some(source_id) = contact.get(keys::ID).and_then(|v| FieldKind::Text.extract(v)) {
            values.insert(columns::SOURCE_ID.to_string(), source_id);
        }

        let name = contact
            .get(keys::NAME)
            .and_then(Value::as_str)
            .map(mapping::normalize_name);
        if let Some(name) = &name {
            values.insert(columns::NAME.to_string(), FieldValue::from(name.as_str()));
        }
        let name = name.unwrap_or_default();

        let id = match store.insert(Table::Contacts, values) {
            Ok(Some(id)) => id,
            Ok(None) => return Err(MaterializeError::Refused { name }),
            Err(source) => return Err(MaterializeError::Store { name, source }),
        };
        tracing::debug!(contact_id = %id, name = %name, "core record inserted");

        // Display name is ignored at insert time by some stores, so it is
        // applied as a follow-up update.
        if let Some(display) = contact
            .get(keys::DISPLAY_NAME)
            .and_then(|v| FieldKind::Text.extract(v))
        {
            let mut update = FieldSet::new();
            update.insert(columns::DISPLAY_NAME.to_string(), display);
            if let Err(e) = store.update(Table::Contacts, update, &Filter::id(id)) {
                tracing::warn!(contact_id = %id, error = %e, "display name update failed");
            }
        }

        let mut writer = self.config.write_mode.writer();
        let mut result = MaterializedContact {
            id,
            name,
            phones: 0,
            contact_methods: 0,
            organizations: 0,
            photo: false,
            children: WriteTally::default(),
            warnings: Vec::new(),
        };

        for phone in entries(contact, keys::PHONE_NUMBERS) {
            let mut values = mapping::map_fields(phone, PHONE_FIELDS);
            values.insert(columns::PERSON.to_string(), id.into());
            writer.write(store, PendingWrite::Insert { table: Table::Phones, values });
            result.phones += 1;
        }

        for method in entries(contact, keys::CONTACT_METHODS) {
            let mut values = mapping::map_fields(method, CONTACT_METHOD_FIELDS);
            values.insert(columns::PERSON.to_string(), id.into());
            writer.write(store, PendingWrite::Insert { table: Table::ContactMethods, values });
            result.contact_methods += 1;
        }

        for org in entries(contact, keys::ORGANIZATIONS) {
            let values = self.organization_values(org, id);
            writer.write(store, PendingWrite::Insert { table: Table::Organizations, values });
            result.organizations += 1;
        }

        match photo_data(contact) {
            Some(Ok(bytes)) => {
                let mut values = FieldSet::new();
                values.insert(columns::PHOTO.to_string(), FieldValue::Blob(Blob(bytes)));
                writer.write(
                    store,
                    PendingWrite::Update {
                        table: Table::Contacts,
                        values,
                        filter: Filter::id(id),
                    },
                );
                result.photo = true;
            }
            Some(Err(e)) => {
                tracing::warn!(contact_id = %id, error = %e, "photo is not valid base64");
                result
                    .warnings
                    .push(format!("Failed to decode photo for {}: {}", result.name, e));
            }
            None => {}
        }

        result.children = writer.finish(store);
        Ok(result)
    }

    fn organization_values(&self, org: &Map<String, Value>, id: RecordId) -> FieldSet {
        let mut values = mapping::map_fields(org, ORGANIZATION_FIELDS);

        // Stores drop organizations without a title.
        let title = org
            .get(keys::TITLE)
            .and_then(|v| FieldKind::Text.extract(v))
            .filter(|t| t.as_str().is_some_and(|s| !s.is_empty()))
            .unwrap_or_else(|| FieldValue::from(self.config.missing_title.as_str()));
        values.insert(columns::TITLE.to_string(), title);

        // Organizations reference the raw contact, which shares the contact id.
        values.insert(columns::RAW_CONTACT_ID.to_string(), id.into());
        values
    }
}

/// Object entries of the array under `key`; nulls and non-objects are skipped
fn entries<'a>(
    contact: &'a Map<String, Value>,
    key: &str,
) -> impl Iterator<Item = &'a Map<String, Value>> + 'a {
    contact
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// The first photo, decoded. `None` when absent or empty.
fn photo_data(contact: &Map<String, Value>) -> Option<Result<Vec<u8>, base64::DecodeError>> {
    let encoded = contact
        .get(keys::PHOTOS)?
        .as_array()?
        .first()?
        .as_str()?;
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    Some(STANDARD.decode(compact))
}
