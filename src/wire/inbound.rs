use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::WireError;
use crate::shared_types::ParticipantId;

// -----------------------------------------------------------------------------
// ----- Inbound ---------------------------------------------------------------

/// One decoded client frame: `{"event": "...", "data": {...}, "ack": 7}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub ack: Option<u64>,
    pub command: ClientCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    JoinSession(JoinRequest),
    StartVoting(StartVotingRequest),
    SubmitVote(SubmitVoteRequest),
    RevealVotes,
    ResetRound,
    KickUser(KickRequest),
    SendMessage(SendMessageRequest),
    EndSession,
    SetTheme(SetThemeRequest),
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::JoinSession(_) => "join-session",
            ClientCommand::StartVoting(_) => "start-voting",
            ClientCommand::SubmitVote(_) => "submit-vote",
            ClientCommand::RevealVotes => "reveal-votes",
            ClientCommand::ResetRound => "reset-round",
            ClientCommand::KickUser(_) => "kick-user",
            ClientCommand::SendMessage(_) => "send-message",
            ClientCommand::EndSession => "end-session",
            ClientCommand::SetTheme(_) => "set-theme",
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Payloads --------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub create: bool,

    #[serde(default)]
    pub theme: Option<String>,
}

impl JoinRequest {
    /// Mirrors the client contract: no session id means "create".
    pub fn wants_create(&self) -> bool {
        self.create
            || self
                .session_id
                .as_deref()
                .is_none_or(|id| id.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartVotingRequest {
    #[serde(default)]
    pub timer_duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitVoteRequest {
    pub vote: VoteValue,
}

/// Cards arrive as strings ("5", "?", "coffee") or as bare numbers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum VoteValue {
    Text(String),
    Number(serde_json::Number),
}

impl VoteValue {
    pub fn into_string(self) -> String {
        match self {
            VoteValue::Text(s) => s,
            VoteValue::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickRequest {
    pub user_id: ParticipantId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SetThemeRequest {
    #[serde(default)]
    pub theme: String,
}

// -----------------------------------------------------------------------------
// ----- Decoding --------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: String,

    #[serde(default)]
    data: Value,

    #[serde(default)]
    ack: Option<u64>,
}

pub fn decode(text: &str) -> Result<Inbound, WireError> {
    let raw: RawFrame =
        serde_json::from_str(text).map_err(|source| WireError::Malformed { source })?;

    let RawFrame { event, data, ack } = raw;

    let command = match event.as_str() {
        "join-session" => ClientCommand::JoinSession(payload(&event, data)?),
        "start-voting" => ClientCommand::StartVoting(payload(&event, data)?),
        "submit-vote" => ClientCommand::SubmitVote(payload(&event, data)?),
        "reveal-votes" => ClientCommand::RevealVotes,
        "reset-round" => ClientCommand::ResetRound,
        "kick-user" => ClientCommand::KickUser(payload(&event, data)?),
        "send-message" => ClientCommand::SendMessage(payload(&event, data)?),
        "end-session" => ClientCommand::EndSession,
        "set-theme" => ClientCommand::SetTheme(payload(&event, data)?),
        _ => return Err(WireError::UnknownEvent(event)),
    };

    Ok(Inbound { ack, command })
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, WireError> {
    // A missing or null payload reads as an empty object so defaults apply.
    let data = match data {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };

    serde_json::from_value(data).map_err(|source| WireError::BadPayload {
        event: event.to_string(),
        source,
    })
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
