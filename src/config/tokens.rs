use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::{path::Path, sync::Arc};
use thiserror::Error;
use tokio::fs;
use tracing::error;

use crate::auth::{AuthContext, Authenticator};
use crate::shared_types::{ParticipantId, SessionId};

// -----------------------------------------------------------------------------
// ----- TokensConfig ----------------------------------------------------------

/// Bearer tokens accepted at connection time. Cloning shares the table, so a
/// reload is seen by every holder.
#[derive(Debug, Clone)]
pub struct TokensConfig {
    inner: Arc<RwLock<TokensTable>>,
}

// -----------------------------------------------------------------------------
// ----- TokensConfig: Static --------------------------------------------------

impl TokensConfig {
    pub async fn load(path: &Path) -> Result<TokensConfig, TokensError> {
        Self::from_file_async(path).await
    }
}

// -----------------------------------------------------------------------------
// ----- TokensConfig: Public --------------------------------------------------

impl TokensConfig {
    /// Reload: on error, DO NOT swap; keep current table and log.
    pub async fn reload(&self, path: &Path) {
        let new_cfg = match Self::from_file_async(path).await {
            Ok(cfg) => cfg,
            Err(e) => {
                error!(
                    "reload failed; keeping previous tokens. path={:?} error={}",
                    path, e
                );
                return;
            }
        };

        let new_table = new_cfg.inner.read().clone();
        *self.inner.write() = new_table;
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Authenticator for TokensConfig {
    fn authenticate(&self, credential: &str) -> Option<AuthContext> {
        let guard = self.inner.read();

        guard
            .records
            .iter()
            .find(|r| r.token.expose_secret() == credential)
            .map(|r| AuthContext {
                participant: r.participant.clone(),
                session: r.session.clone(),
                display_name: r.display_name.clone(),
            })
    }
}

// -----------------------------------------------------------------------------
// ----- TokensConfig: Private -------------------------------------------------

impl TokensConfig {
    async fn from_file_async(path: &Path) -> Result<TokensConfig, TokensError> {
        let raw = fs::read_to_string(path).await.map_err(|e| TokensError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&raw)
    }

    fn parse(raw: &str) -> Result<TokensConfig, TokensError> {
        let mut doc: TokensFile =
            toml::from_str(raw).map_err(|e| TokensError::Toml { source: e })?;

        let mut records: Vec<TokenRecord> = Vec::with_capacity(doc.tokens.len());
        for entry in doc.tokens.drain(..) {
            validate(&entry)?;

            let session = SessionId::parse(&entry.session_id)
                .ok_or(TokensError::InvalidField("session_id".into()))?;

            if records
                .iter()
                .any(|r| r.token.expose_secret() == entry.token)
            {
                return Err(TokensError::DuplicateToken {
                    user_id: entry.user_id,
                });
            }

            records.push(TokenRecord {
                token: SecretString::new(entry.token.into_boxed_str()),
                participant: ParticipantId::new(entry.user_id),
                session,
                display_name: entry.username.trim().to_string(),
            });
        }

        Ok(TokensConfig {
            inner: Arc::new(RwLock::new(TokensTable { records })),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: table -------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct TokensTable {
    records: Vec<TokenRecord>,
}

#[derive(Debug, Clone)]
struct TokenRecord {
    token: SecretString,
    participant: ParticipantId,
    session: SessionId,
    display_name: String,
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct TokensFile {
    #[serde(default)]
    tokens: Vec<TokensFileEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct TokensFileEntry {
    token: String,

    #[serde(alias = "userId")]
    user_id: String,

    #[serde(alias = "sessionId")]
    session_id: String,

    #[serde(alias = "name")]
    username: String,
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn validate(t: &TokensFileEntry) -> Result<(), TokensError> {
    if t.token.is_empty() {
        return Err(TokensError::InvalidField("token".into()));
    }
    if t.user_id.trim().is_empty() {
        return Err(TokensError::InvalidField("user_id".into()));
    }
    if t.username.trim().is_empty() {
        return Err(TokensError::InvalidField("username".into()));
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TokensError {
    #[error("duplicate token (second entry for user '{user_id}')")]
    DuplicateToken { user_id: String },

    #[error("invalid or missing field '{0}'")]
    InvalidField(String),

    #[error("read error for {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
