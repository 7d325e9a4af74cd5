use thiserror::Error;

use crate::shared_types::SessionId;

// -----------------------------------------------------------------------------
// ----- SessionError ----------------------------------------------------------

/// Everything a session operation can refuse.
///
/// Only `NotFound` is ever shown to a client (as a failed acknowledgment).
/// The rest are precondition violations the gateway drops after logging.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(SessionId),

    #[error("connection is not attached to a session")]
    NoContext,

    #[error("participant is not a member of the session")]
    NotMember,

    #[error("round is not accepting votes")]
    NotVoting,

    #[error("only the session creator may {action}")]
    NotCreator { action: &'static str },

    #[error("the session creator cannot be kicked")]
    CannotKickCreator,

    #[error("invalid or missing field '{0}'")]
    InvalidField(&'static str),
}

impl SessionError {
    /// Message placed in a failed acknowledgment.
    pub fn client_message(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "Session not found",
            SessionError::InvalidField(_) => "Invalid request",
            _ => "Request rejected",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound(_))
    }
}

// -----------------------------------------------------------------------------
// ----- WireError -------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed frame: {source}")]
    Malformed { source: serde_json::Error },

    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("bad payload for '{event}': {source}")]
    BadPayload {
        event: String,
        source: serde_json::Error,
    },

    #[error("binary frames are not supported")]
    Binary,
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
