use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::{ChatMessage, RevealedVote, RosterEntry, RoundSummary, Session};
use crate::shared_types::{ParticipantId, SessionId};

// -----------------------------------------------------------------------------
// ----- ServerEvent -----------------------------------------------------------

/// Everything the server pushes without being asked. Serialized as
/// `{"event": "<kebab-name>", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    ThemeChanged(String),
    ParticipantsUpdated(Vec<RosterEntry>),
    VotingStarted(VotingStarted),
    UserVoted(UserVoted),
    VotesRevealed(VotesRevealed),
    RoundReset(RoundReset),
    Kicked,
    ChatMessage(ChatMessage),
    ChatHistory(Vec<ChatMessage>),
    SessionEnded,
}

impl ServerEvent {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingStarted {
    pub timer_duration: u64,
    pub timer_started_at: Option<DateTime<Utc>>,
    pub round_number: u64,

    /// Only present in the snapshot a late joiner receives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revealed: Option<bool>,
}

impl VotingStarted {
    /// Snapshot of the running round for someone who just arrived.
    pub fn snapshot(session: &Session) -> Option<Self> {
        let round = session.round();
        if !round.is_active() {
            return None;
        }

        let timer = round.timer();
        Some(Self {
            timer_duration: timer.map(|t| t.duration_secs).unwrap_or(0),
            timer_started_at: timer.map(|t| t.started_at),
            round_number: round.sequence(),
            revealed: Some(round.phase() == crate::session::RoundPhase::Revealed),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserVoted {
    pub user_id: ParticipantId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VotesRevealed {
    pub votes: Vec<RevealedVote>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundReset {
    pub round_history: Vec<RoundSummary>,
}

// -----------------------------------------------------------------------------
// ----- Acknowledgments -------------------------------------------------------

/// Reply to a single request: `{"ack": <id>, "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AckFrame {
    pub ack: u64,
    pub data: JoinAck,
}

impl AckFrame {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAck {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<ParticipantId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_creator: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JoinAck {
    pub fn joined(session_id: SessionId, user_id: ParticipantId, is_creator: bool) -> Self {
        Self {
            success: true,
            session_id: Some(session_id),
            user_id: Some(user_id),
            is_creator: Some(is_creator),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            session_id: None,
            user_id: None,
            is_creator: None,
            error: Some(error.into()),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
