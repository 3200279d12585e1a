//! Dismissable user-facing notifications.
//!
//! Failed operations and recoverable problems (persistence, mesh builds) are
//! surfaced here. The RPC bridge forwards new notifications to the page;
//! the page dismisses them by id.

use bevy::prelude::*;
use constants::defaults::MAX_VISIBLE_NOTIFICATIONS;
use serde::Serialize;

use crate::error::{ErrorKind, OverlayError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: u64,
    pub level: NotificationLevel,
    pub kind: Option<ErrorKind>,
    pub message: String,
}

#[derive(Resource, Debug, Default)]
pub struct Notifications {
    next_id: u64,
    visible: Vec<Notification>,
    /// Notifications not yet forwarded to the host page.
    outbox: Vec<Notification>,
}

impl Notifications {
    pub fn push(&mut self, level: NotificationLevel, kind: Option<ErrorKind>, message: impl Into<String>) -> u64 {
        self.next_id += 1;
        let notification = Notification {
            id: self.next_id,
            level,
            kind,
            message: message.into(),
        };
        self.outbox.push(notification.clone());
        self.visible.push(notification);
        if self.visible.len() > MAX_VISIBLE_NOTIFICATIONS {
            let overflow = self.visible.len() - MAX_VISIBLE_NOTIFICATIONS;
            self.visible.drain(..overflow);
        }
        self.next_id
    }

    /// Record an operation failure. Persistence and mesh build problems are
    /// warnings because the in-memory state stays usable.
    pub fn report(&mut self, error: &OverlayError) -> u64 {
        let level = match error {
            OverlayError::PersistenceFailure(_) | OverlayError::MeshBuildFailure { .. } => {
                NotificationLevel::Warning
            }
            _ => NotificationLevel::Error,
        };
        self.push(level, Some(error.kind()), error.to_string())
    }

    /// Remove a notification; unknown ids are ignored.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.visible.len();
        self.visible.retain(|n| n.id != id);
        before != self.visible.len()
    }

    pub fn visible(&self) -> &[Notification] {
        &self.visible
    }

    pub fn take_outbox(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }
}
