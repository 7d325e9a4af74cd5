use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// -----------------------------------------------------------------------------
// ----- ParticipantId ---------------------------------------------------------

/// Opaque participant identity. Anonymous connections get a random one; the
/// authenticator may hand out a stable one instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn random() -> Self {
        ParticipantId(Uuid::new_v4().simple().to_string())
    }

    pub fn new(raw: impl Into<String>) -> Self {
        ParticipantId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
