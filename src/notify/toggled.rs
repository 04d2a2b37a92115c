//! Per-kind on/off switches from the config file.

use super::{NotificationEvent, NotificationKind, Notifier, NotifyError};
use crate::config::NotificationSettings;

/// Forwards only the kinds enabled in [`NotificationSettings`].
#[derive(Debug)]
pub struct ToggledNotifier<N> {
    inner: N,
    settings: NotificationSettings,
}

impl<N> ToggledNotifier<N> {
    pub fn new(inner: N, settings: NotificationSettings) -> Self {
        Self { inner, settings }
    }

    pub fn inner(&self) -> &N {
        &self.inner
    }

    pub fn is_enabled(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::NewPr => self.settings.on_new_pr,
            NotificationKind::CodeChange => self.settings.on_code_change,
            NotificationKind::Merge => self.settings.on_merge,
        }
    }
}

impl<N: Notifier> Notifier for ToggledNotifier<N> {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        if !self.is_enabled(event.kind()) {
            tracing::debug!(pr = %event.pr_number(), kind = ?event.kind(), "Notification kind disabled");
            return Ok(());
        }
        self.inner.notify(event).await
    }
}
