//! JSON-lines outbox for an external mailer.
//!
//! Each notification becomes one line, synced to disk before `notify`
//! returns. A mailer tails the file and sends the messages.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{NotificationEvent, Notifier, NotifyError};
use crate::store::fsync_file;

#[derive(Serialize)]
struct OutboxLine<'a> {
    ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<&'a str>,
    subject: String,
    #[serde(flatten)]
    event: &'a NotificationEvent,
}

#[derive(Debug)]
pub struct OutboxNotifier {
    file: Arc<Mutex<File>>,
    path: PathBuf,
    recipient: Option<String>,
}

impl OutboxNotifier {
    /// Opens (or creates) the outbox for appending.
    pub fn open(path: impl AsRef<Path>, recipient: Option<String>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            path,
            recipient,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Notifier for OutboxNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let mut line = serde_json::to_vec(&OutboxLine {
            ts: Utc::now(),
            to: self.recipient.as_deref(),
            subject: event.subject(),
            event,
        })?;
        line.push(b'\n');

        let file = self.file.clone();
        tokio::task::spawn_blocking(move || -> Result<(), NotifyError> {
            let mut file = file.lock().expect("outbox mutex poisoned");
            file.write_all(&line)?;
            fsync_file(&file)?;
            Ok(())
        })
        .await
        .map_err(|e| NotifyError::Rejected(format!("outbox writer panicked: {e}")))?
    }
}
