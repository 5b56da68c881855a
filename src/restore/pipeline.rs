//! Restore pipeline: scan, parse and materialize contacts one at a time
//!
//! A fresh restore always clears every table first and then reads the
//! backup from byte zero. Contacts are committed as they close, so an
//! interrupted run leaves the contacts written so far in place.

use crate::error::RestoreError;
use crate::notify::{Notification, ProgressSink};
use crate::restore::materializer::ContactMaterializer;
use crate::scan::{BoundaryScanner, CancellationToken, Fragment, ScanEvent};
use crate::store::RecordStore;
use crate::types::{RestoreConfig, RestoreState, Table};
use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

/// Counters for a finished restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub restored: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

/// Remove every contact and every child row
pub fn clear_contacts<S: RecordStore>(store: &mut S) -> Result<usize, RestoreError> {
    let mut removed = 0;
    // Children first so no row ever points at a missing contact.
    for table in [Table::Phones, Table::ContactMethods, Table::Organizations, Table::Contacts] {
        removed += store.delete_all(table)?;
    }
    tracing::info!(removed, "cleared existing contacts");
    Ok(removed)
}

/// Restore from an already opened stream of `total` bytes.
///
/// Does not clear the store; see [`restore_file`].
pub fn restore_stream<S, R, P>(
    store: &mut S,
    reader: R,
    total: u64,
    config: &RestoreConfig,
    cancel: &CancellationToken,
    sink: &mut P,
) -> Result<RestoreSummary, RestoreError>
where
    S: RecordStore,
    R: Read,
    P: ProgressSink,
{
    let materializer = ContactMaterializer::new(config.clone());
    let mut scanner =
        BoundaryScanner::new(reader, total, config.progress_interval, cancel.clone());
    let mut summary = RestoreSummary::default();
    let mut fatal = None;

    for event in scanner.by_ref() {
        match event {
            Ok(ScanEvent::Progress { position, total }) => sink.progress(position, total),
            Ok(ScanEvent::Fragment(fragment)) => {
                if restore_fragment(store, &materializer, &fragment, sink) {
                    summary.restored += 1;
                } else {
                    summary.skipped += 1;
                }
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(error = %e, "backup stream failed");
                sink.error(e.to_string());
                fatal = Some(e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed contact");
                sink.error(e.to_string());
                summary.skipped += 1;
            }
        }
    }
    summary.cancelled = scanner.was_cancelled();

    tracing::info!(
        restored = summary.restored,
        skipped = summary.skipped,
        cancelled = summary.cancelled,
        "restore finished"
    );

    match fatal {
        Some(e) => Err(e.into()),
        None => Ok(summary),
    }
}

/// Parse and write one fragment. Returns whether the contact was stored.
fn restore_fragment<S, P>(
    store: &mut S,
    materializer: &ContactMaterializer,
    fragment: &Fragment,
    sink: &mut P,
) -> bool
where
    S: RecordStore,
    P: ProgressSink,
{
    let contact = match serde_json::from_str::<Value>(&fragment.text) {
        Ok(Value::Object(contact)) => contact,
        Ok(_) => {
            sink.error(format!("Contact at byte {} is not an object", fragment.offset));
            return false;
        }
        Err(e) => {
            tracing::warn!(offset = fragment.offset, error = %e, "contact is not valid JSON");
            sink.error(e.to_string());
            return false;
        }
    };

    match materializer.materialize(store, &contact) {
        Ok(written) => {
            for warning in written.warnings {
                sink.error(warning);
            }
            tracing::debug!(
                contact_id = %written.id,
                phones = written.phones,
                contact_methods = written.contact_methods,
                organizations = written.organizations,
                failed_children = written.children.failed,
                "contact restored"
            );
            sink.info(written.name);
            true
        }
        Err(e) => {
            tracing::warn!(offset = fragment.offset, error = %e, "contact not restored");
            sink.error(e.to_string());
            false
        }
    }
}

/// Replace all contacts in `store` with the contents of the backup at `path`.
///
/// The file is opened before anything is deleted, so a missing backup
/// leaves the store untouched.
pub fn restore_file<S, P>(
    store: &mut S,
    path: &Path,
    config: &RestoreConfig,
    cancel: &CancellationToken,
    sink: &mut P,
) -> Result<RestoreSummary, RestoreError>
where
    S: RecordStore,
    P: ProgressSink,
{
    let opened = File::open(path).and_then(|file| {
        let total = file.metadata()?.len();
        Ok((file, total))
    });
    let (file, total) = match opened {
        Ok(opened) => opened,
        Err(source) => {
            let err = RestoreError::Open {
                path: path.display().to_string(),
                source,
            };
            tracing::error!(error = %err, "cannot open backup");
            sink.error(err.to_string());
            return Err(err);
        }
    };

    if let Err(e) = clear_contacts(store) {
        sink.error(e.to_string());
        return Err(e);
    }

    tracing::info!(path = %path.display(), bytes = total, "restoring contacts");
    restore_stream(store, file, total, config, cancel, sink)
}

/// Outcome of a worker thread: the store is handed back either way
pub type WorkerResult<S> = (S, Result<RestoreSummary, RestoreError>);

/// A restore running on its own thread.
///
/// Notifications arrive in emission order on [`RestoreWorker::notifications`];
/// the channel closes when the worker is done.
pub struct RestoreWorker<S> {
    handle: JoinHandle<WorkerResult<S>>,
    cancel: CancellationToken,
    notifications: Receiver<Notification>,
}

impl<S: RecordStore + Send + 'static> RestoreWorker<S> {
    pub fn spawn(store: S, path: PathBuf, config: RestoreConfig) -> std::io::Result<Self> {
        let cancel = CancellationToken::new();
        let (tx, notifications) = mpsc::channel();
        let worker_cancel = cancel.clone();

        let handle = thread::Builder::new()
            .name("restore".to_string())
            .spawn(move || {
                let mut store = store;
                let mut sink = tx;
                let result = restore_file(&mut store, &path, &config, &worker_cancel, &mut sink);
                (store, result)
            })?;

        Ok(RestoreWorker {
            handle,
            cancel,
            notifications,
        })
    }
}

impl<S> RestoreWorker<S> {
    /// Ask the worker to stop before the next contact
    pub fn finish(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn notifications(&self) -> &Receiver<Notification> {
        &self.notifications
    }

    pub fn state(&self) -> RestoreState {
        if self.handle.is_finished() {
            RestoreState::Done
        } else {
            RestoreState::Running
        }
    }

    pub fn join(self) -> thread::Result<WorkerResult<S>> {
        self.handle.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{FieldSet, FieldValue};
    use std::io::Cursor;

    fn run(
        store: &mut MemoryStore,
        input: &str,
        cancel: &CancellationToken,
    ) -> (RestoreSummary, Vec<Notification>) {
        let mut sink: Vec<Notification> = Vec::new();
        let summary = restore_stream(
            store,
            Cursor::new(input.to_string()),
            input.len() as u64,
            &RestoreConfig::default(),
            cancel,
            &mut sink,
        )
        .unwrap();
        (summary, sink)
    }

    fn infos(notifications: &[Notification]) -> Vec<String> {
        notifications
            .iter()
            .filter_map(|n| match n {
                Notification::Info { name } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn errors(notifications: &[Notification]) -> usize {
        notifications
            .iter()
            .filter(|n| matches!(n, Notification::Error { .. }))
            .count()
    }

    #[test]
    fn test_restores_every_contact_in_order() {
        let mut store = MemoryStore::new();
        let input = r#"[
            {"name": "Doe,John", "phonenumbers": [{"number": "1"}]},
            {"name": "Acme Corp", "organizations": [{"company": "Acme"}]}
        ]"#;
        let (summary, notes) = run(&mut store, input, &CancellationToken::new());

        assert_eq!(summary, RestoreSummary { restored: 2, skipped: 0, cancelled: false });
        assert_eq!(infos(&notes), vec!["John Doe", "Acme Corp"]);
        assert_eq!(store.len(Table::Contacts), 2);
        assert_eq!(
            notes.last(),
            Some(&Notification::Progress { position: input.len() as u64, total: input.len() as u64 })
        );
    }

    #[test]
    fn test_bad_fragment_is_skipped_and_scanning_continues() {
        let mut store = MemoryStore::new();
        let input = r#"{"name": "A"} {"name": } {"name": "C"}"#;
        let (summary, notes) = run(&mut store, input, &CancellationToken::new());

        assert_eq!(summary.restored, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(errors(&notes), 1);
        assert_eq!(infos(&notes), vec!["A", "C"]);
    }

    #[test]
    fn test_extra_closing_brace_skips_only_that_contact() {
        let mut store = MemoryStore::new();
        let input = r#"[{"name": "A", "x": }}, {"name": "B"}]"#;
        let (summary, notes) = run(&mut store, input, &CancellationToken::new());

        assert_eq!(summary.skipped, 1);
        assert_eq!(errors(&notes), 1);
        assert_eq!(infos(&notes), vec!["B"]);
    }

    #[test]
    fn test_refused_contact_does_not_affect_next() {
        let mut store = MemoryStore::new().refuse_if(|table, values: &FieldSet| {
            table == Table::Contacts && values.get("name") == Some(&FieldValue::from("Bad"))
        });
        let input = r#"
            {"name": "Bad", "phonenumbers": [{"number": "1"}]}
            {"name": "Good", "phonenumbers": [{"number": "2"}]}
        "#;
        let (summary, notes) = run(&mut store, input, &CancellationToken::new());

        assert_eq!(summary.restored, 1);
        assert_eq!(infos(&notes), vec!["Good"]);
        assert_eq!(store.len(Table::Phones), 1);
        assert_eq!(
            store.rows(Table::Phones)[0].get("number"),
            Some(&FieldValue::from("2"))
        );
    }

    #[test]
    fn test_cancel_before_start_restores_nothing() {
        let mut store = MemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (summary, notes) = run(&mut store, r#"[{"name": "A"}]"#, &cancel);

        assert!(summary.cancelled);
        assert_eq!(summary.restored, 0);
        assert!(store.is_empty());
        assert!(matches!(notes.last(), Some(Notification::Progress { .. })));
    }

    struct CancelAfter {
        remaining: usize,
        cancel: CancellationToken,
        seen: Vec<Notification>,
    }

    impl ProgressSink for CancelAfter {
        fn notify(&mut self, notification: Notification) {
            if matches!(notification, Notification::Info { .. }) {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.cancel.cancel();
                }
            }
            self.seen.push(notification);
        }
    }

    #[test]
    fn test_cancel_after_k_contacts_keeps_exactly_k() {
        let mut store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let mut sink = CancelAfter { remaining: 2, cancel: cancel.clone(), seen: Vec::new() };
        let input: String = (0..5)
            .map(|i| format!(r#"{{"name": "C{}", "phonenumbers": [{{"number": "{}"}}]}}"#, i, i))
            .collect();

        let summary = restore_stream(
            &mut store,
            Cursor::new(input.clone()),
            input.len() as u64,
            &RestoreConfig::default(),
            &cancel,
            &mut sink,
        )
        .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.restored, 2);
        assert_eq!(store.len(Table::Contacts), 2);
        assert_eq!(store.len(Table::Phones), 2);
        assert_eq!(
            sink.seen.last(),
            Some(&Notification::Progress { position: input.len() as u64, total: input.len() as u64 })
        );
    }

    #[test]
    fn test_restore_file_clears_existing_contacts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.json");
        std::fs::write(&path, r#"[{"name": "New"}]"#).unwrap();

        let mut store = MemoryStore::new();
        let mut old = FieldSet::new();
        old.insert("name".to_string(), FieldValue::from("Old"));
        store.insert(Table::Contacts, old).unwrap();
        store.insert(Table::Phones, FieldSet::new()).unwrap();

        let mut sink: Vec<Notification> = Vec::new();
        let summary = restore_file(
            &mut store,
            &path,
            &RestoreConfig::default(),
            &CancellationToken::new(),
            &mut sink,
        )
        .unwrap();

        assert_eq!(summary.restored, 1);
        assert_eq!(store.len(Table::Contacts), 1);
        assert_eq!(store.len(Table::Phones), 0);
        assert_eq!(
            store.rows(Table::Contacts)[0].get("name"),
            Some(&FieldValue::from("New"))
        );
    }

    #[test]
    fn test_missing_file_reports_and_keeps_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::new();
        store.insert(Table::Contacts, FieldSet::new()).unwrap();

        let mut sink: Vec<Notification> = Vec::new();
        let err = restore_file(
            &mut store,
            &dir.path().join("missing.json"),
            &RestoreConfig::default(),
            &CancellationToken::new(),
            &mut sink,
        )
        .unwrap_err();

        assert!(matches!(err, RestoreError::Open { .. }));
        assert_eq!(errors(&sink), 1);
        assert_eq!(store.len(Table::Contacts), 1);
    }

    #[test]
    fn test_worker_delivers_notifications_and_returns_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.json");
        let body: String = (0..50).map(|i| format!(r#"{{"name": "P{}"}},"#, i)).collect();
        std::fs::write(&path, format!("[{}]", body.trim_end_matches(','))).unwrap();
        let total = std::fs::metadata(&path).unwrap().len();

        let worker = RestoreWorker::spawn(MemoryStore::new(), path, RestoreConfig::default()).unwrap();
        let notes: Vec<_> = worker.notifications().iter().collect();
        let (store, result) = worker.join().unwrap();

        assert_eq!(result.unwrap().restored, 50);
        assert_eq!(store.len(Table::Contacts), 50);
        assert_eq!(infos(&notes).len(), 50);
        assert_eq!(notes.last(), Some(&Notification::Progress { position: total, total }));
    }
}
