//! Notifications from a restore/export worker to its presentation side
//!
//! Delivery must be ordered and lossless: the final `Progress` with
//! `position == total` is what closes a progress display.

use serde::Serialize;
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A contact was written
    Info { name: String },
    Progress { position: u64, total: u64 },
    Error { message: String },
}

pub trait ProgressSink {
    fn notify(&mut self, notification: Notification);

    fn info(&mut self, name: impl Into<String>)
    where
        Self: Sized,
    {
        self.notify(Notification::Info { name: name.into() });
    }

    fn progress(&mut self, position: u64, total: u64)
    where
        Self: Sized,
    {
        self.notify(Notification::Progress { position, total });
    }

    fn error(&mut self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.notify(Notification::Error {
            message: message.into(),
        });
    }
}

impl ProgressSink for Sender<Notification> {
    fn notify(&mut self, notification: Notification) {
        // A dropped receiver means nobody is watching; the work still completes.
        if self.send(notification).is_err() {
            tracing::debug!("notification receiver dropped");
        }
    }
}

impl ProgressSink for Vec<Notification> {
    fn notify(&mut self, notification: Notification) {
        self.push(notification);
    }
}
