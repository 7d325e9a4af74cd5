use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::shared_types::ParticipantId;

// -----------------------------------------------------------------------------
// ----- Participant -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub username: String,
    pub joined_at: DateTime<Utc>,
    pub connected: bool,
}

impl Participant {
    pub fn new(id: ParticipantId, username: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            username: username.into(),
            joined_at: now,
            connected: true,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- RosterEntry -----------------------------------------------------------

/// A participant as shown to everyone in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    #[serde(flatten)]
    pub participant: Participant,
    pub is_creator: bool,
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
