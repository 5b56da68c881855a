//! Export contacts from a record store into a JSON backup
//!
//! The output is a JSON array with one object per contact, written one
//! contact at a time. It uses the same keys the restore side reads, so an
//! export can be restored as-is.

use crate::error::ExportError;
use crate::notify::ProgressSink;
use crate::restore::mapping::{
    columns, keys, unmap_fields, FieldKind, CONTACT_FIELDS, CONTACT_METHOD_FIELDS,
    ORGANIZATION_FIELDS, PHONE_FIELDS,
};
use crate::scan::CancellationToken;
use crate::store::RecordStore;
use crate::types::{FieldSet, FieldValue, Filter, Table};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::Write;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub exported: usize,
    pub cancelled: bool,
}

/// Child rows grouped by the contact id they point at
fn group_by(rows: Vec<FieldSet>, foreign_key: &str) -> HashMap<i64, Vec<FieldSet>> {
    let mut grouped: HashMap<i64, Vec<FieldSet>> = HashMap::new();
    for row in rows {
        if let Some(id) = row.get(foreign_key).and_then(FieldValue::as_i64) {
            grouped.entry(id).or_default().push(row);
        }
    }
    grouped
}

fn children(
    grouped: &mut HashMap<i64, Vec<FieldSet>>,
    id: i64,
    build: impl Fn(&FieldSet) -> Map<String, Value>,
) -> Value {
    let rows = grouped.remove(&id).unwrap_or_default();
    Value::Array(rows.iter().map(|row| Value::Object(build(row))).collect())
}

fn text(row: &FieldSet, column: &str) -> Option<Value> {
    row.get(column).and_then(|v| FieldKind::Text.to_json(v))
}

fn organization_json(row: &FieldSet) -> Map<String, Value> {
    let mut org = unmap_fields(row, ORGANIZATION_FIELDS);
    if let Some(title) = text(row, columns::TITLE) {
        org.insert(keys::TITLE.to_string(), title);
    }
    org
}

/// Write every contact in `store` as a JSON array to `out`.
///
/// Cancellation is checked between contacts; the array is always closed,
/// so a cancelled export is still valid JSON. The last notification is
/// always `Progress(total, total)`, even for an empty store.
pub fn export_contacts<S, W, P>(
    store: &S,
    mut out: W,
    cancel: &CancellationToken,
    sink: &mut P,
) -> Result<ExportSummary, ExportError>
where
    S: RecordStore + ?Sized,
    W: Write,
    P: ProgressSink,
{
    let mut contacts = store.query(Table::Contacts, &Filter::All)?;
    contacts.sort_by_key(|row| row.get(columns::ID).and_then(FieldValue::as_i64));

    let mut phones = group_by(store.query(Table::Phones, &Filter::All)?, columns::PERSON);
    let mut methods = group_by(
        store.query(Table::ContactMethods, &Filter::All)?,
        columns::PERSON,
    );
    let mut orgs = group_by(
        store.query(Table::Organizations, &Filter::All)?,
        columns::RAW_CONTACT_ID,
    );

    let total = contacts.len() as u64;
    let mut summary = ExportSummary::default();
    tracing::info!(contacts = total, "exporting contacts");

    let mut position = 0u64;
    let mut reported = None;

    out.write_all(b"[")?;
    for row in &contacts {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }
        position += 1;
        let Some(id) = row.get(columns::ID).and_then(FieldValue::as_i64) else {
            tracing::warn!(position, "contact row without id skipped");
            continue;
        };

        let mut contact = Map::new();
        // Keep the id the contact had in its original backup when known
        let backup_id = text(row, columns::SOURCE_ID)
            .unwrap_or_else(|| Value::String(id.to_string()));
        contact.insert(keys::ID.to_string(), backup_id);
        if let Some(name) = text(row, columns::NAME) {
            contact.insert(keys::NAME.to_string(), name);
        }
        if let Some(display) = text(row, columns::DISPLAY_NAME) {
            contact.insert(keys::DISPLAY_NAME.to_string(), display);
        }
        contact.extend(unmap_fields(row, CONTACT_FIELDS));

        contact.insert(
            keys::PHONE_NUMBERS.to_string(),
            children(&mut phones, id, |r| unmap_fields(r, PHONE_FIELDS)),
        );
        contact.insert(
            keys::CONTACT_METHODS.to_string(),
            children(&mut methods, id, |r| unmap_fields(r, CONTACT_METHOD_FIELDS)),
        );
        contact.insert(
            keys::ORGANIZATIONS.to_string(),
            children(&mut orgs, id, organization_json),
        );

        let photos = match row.get(columns::PHOTO) {
            Some(FieldValue::Blob(blob)) => vec![Value::String(STANDARD.encode(&blob.0))],
            _ => Vec::new(),
        };
        contact.insert(keys::PHOTOS.to_string(), Value::Array(photos));

        if summary.exported > 0 {
            out.write_all(b",")?;
        }
        out.write_all(b"\n")?;
        serde_json::to_writer(&mut out, &contact)?;

        summary.exported += 1;
        let name = contact
            .get(keys::NAME)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        sink.info(name);
        sink.progress(position, total);
        reported = Some(position);
    }
    out.write_all(b"\n]\n")?;
    out.flush()?;

    if reported != Some(total) {
        sink.progress(total, total);
    }
    tracing::info!(exported = summary.exported, cancelled = summary.cancelled, "export finished");
    Ok(summary)
}
