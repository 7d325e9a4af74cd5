use crate::shared_types::{ParticipantId, SessionId};

// -----------------------------------------------------------------------------
// ----- AuthContext -----------------------------------------------------------

/// What a valid credential vouches for: who the connection is and which
/// session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub participant: ParticipantId,
    pub session: SessionId,
    pub display_name: String,
}

// -----------------------------------------------------------------------------
// ----- Authenticator ---------------------------------------------------------

/// Maps a connection credential to an identity. Consulted once, during the
/// WebSocket handshake.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credential: &str) -> Option<AuthContext>;
}

/// Accepts nobody. Used when no tokens file is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl Authenticator for Anonymous {
    fn authenticate(&self, _credential: &str) -> Option<AuthContext> {
        None
    }
}

// -----------------------------------------------------------------------------
// ----- Credential extraction -------------------------------------------------

const BEARER_PREFIX: &str = "Bearer ";

/// Pulls a credential out of handshake metadata: an `Authorization: Bearer`
/// header wins over a `token` query parameter.
pub fn credential_from(authorization: Option<&str>, query: Option<&str>) -> Option<String> {
    if let Some(token) = authorization
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_string());
    }

    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|v| !v.is_empty())
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
