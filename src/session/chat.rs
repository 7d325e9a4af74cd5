use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::shared_types::ParticipantId;

// -----------------------------------------------------------------------------
// ----- ChatMessage -----------------------------------------------------------

/// Append-only. The author's name is copied at send time so later renames or
/// departures do not rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub user_id: ParticipantId,
    pub username: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        author: ParticipantId,
        username: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: author,
            username: username.into(),
            message: message.into(),
            timestamp: now,
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
