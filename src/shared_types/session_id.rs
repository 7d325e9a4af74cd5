use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const SESSION_ID_BYTES: usize = 4;
const SESSION_ID_LEN: usize = SESSION_ID_BYTES * 2;

// -----------------------------------------------------------------------------
// ----- SessionId -------------------------------------------------------------

/// Short, human-typeable session code: 8 uppercase hex characters drawn from
/// the thread-local CSPRNG.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

// -----------------------------------------------------------------------------
// ----- SessionId: Static -----------------------------------------------------

impl SessionId {
    pub fn random() -> Self {
        let bytes: [u8; SESSION_ID_BYTES] = rand::rng().random();

        let mut code = String::with_capacity(SESSION_ID_LEN);
        for b in bytes {
            code.push_str(&format!("{b:02X}"));
        }

        SessionId(code)
    }

    /// Accepts what a person would type: any case, surrounding whitespace.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();

        if trimmed.len() != SESSION_ID_LEN {
            return None;
        }

        if !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        Some(SessionId(trimmed.to_ascii_uppercase()))
    }
}

// -----------------------------------------------------------------------------
// ----- SessionId: Public -----------------------------------------------------

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
