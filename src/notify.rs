use crate::types::{MatchId, TeamId, TournamentId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecipientType {
    Admin,
    Team,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient_type: RecipientType,
    pub recipient_id: Option<TeamId>,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub tournament_id: Option<TournamentId>,
    pub match_id: Option<MatchId>,
}

/// Outbound notification sender. Delivery is best-effort: the core logs a
/// failure and carries on, it never rolls back a transition over one.
pub trait Notifier: Send + Sync {
    fn create_notification(&self, notification: &Notification) -> Result<(), String>;
}

/// Default sink that writes notifications to the log instead of delivering
/// them anywhere.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn create_notification(&self, notification: &Notification) -> Result<(), String> {
        info!(
            kind = %notification.kind,
            priority = ?notification.priority,
            recipient = ?notification.recipient_type,
            match_id = ?notification.match_id,
            "notification: {}",
            notification.message
        );
        Ok(())
    }
}

/// Fire-and-forget send; failures are logged and swallowed.
pub fn send_best_effort(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.create_notification(&notification) {
        warn!("notification send failed ({}): {e}", notification.kind);
    }
}
