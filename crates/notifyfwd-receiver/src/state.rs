//! Shared receiver state and notification fan-out

use chrono::{DateTime, Utc};
use notifyfwd_core::NotifyRequest;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

/// Number of notifications kept for late subscribers
const HISTORY_LIMIT: usize = 32;

/// A notification as it arrived
#[derive(Debug, Clone, Serialize)]
pub struct ReceivedNotification {
    pub request: NotifyRequest,
    pub received_at: DateTime<Utc>,
}

/// Shared application state
pub struct ReceiverState {
    /// Version reported on `/api/version`
    pub version: String,
    /// Notification broadcast sender
    pub notification_tx: broadcast::Sender<ReceivedNotification>,
    /// Most recent notifications, oldest first
    history: RwLock<VecDeque<ReceivedNotification>>,
}

impl ReceiverState {
    /// Create a new receiver state
    pub fn new(version: impl Into<String>) -> Self {
        let (notification_tx, _) = broadcast::channel(64);
        Self {
            version: version.into(),
            notification_tx,
            history: RwLock::new(VecDeque::with_capacity(HISTORY_LIMIT)),
        }
    }

    /// Record a notification and fan it out to subscribers
    pub fn publish(&self, request: NotifyRequest) -> ReceivedNotification {
        let notification = ReceivedNotification {
            request,
            received_at: Utc::now(),
        };

        {
            let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
            if history.len() == HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(notification.clone());
        }

        // No subscribers is fine
        let _ = self.notification_tx.send(notification.clone());
        notification
    }

    /// Subscribe to incoming notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ReceivedNotification> {
        self.notification_tx.subscribe()
    }

    /// Get the retained notifications, oldest first
    pub fn recent(&self) -> Vec<ReceivedNotification> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}
