use serde::Deserialize;
use std::{path::Path, time::Duration};
use thiserror::Error;
use tokio::fs;

// -----------------------------------------------------------------------------
// ----- Defaults --------------------------------------------------------------

const DEFAULT_THEME: &str = "modern";
const DEFAULT_MAX_TIMER: Duration = Duration::from_secs(60 * 60);
// Round timers are whole seconds.
const MIN_MAX_TIMER: Duration = Duration::from_secs(1);
const DEFAULT_MAX_NAME_LEN: usize = 40;
const DEFAULT_MAX_MESSAGE_LEN: usize = 2000;

// -----------------------------------------------------------------------------
// ----- SessionSettings -------------------------------------------------------

/// Knobs for session behavior. Every key is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub default_theme: String,
    /// Longer round timers are clamped to this.
    pub max_timer: Duration,
    /// Display names longer than this (in chars) are refused.
    pub max_name_len: usize,
    /// Chat messages longer than this (in chars) are dropped.
    pub max_message_len: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_theme: DEFAULT_THEME.to_string(),
            max_timer: DEFAULT_MAX_TIMER,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- SessionSettings: Static -----------------------------------------------

impl SessionSettings {
    /// No file means defaults.
    pub async fn load(path: Option<&Path>) -> Result<SessionSettings, SettingsError> {
        let Some(path) = path else {
            return Ok(SessionSettings::default());
        };

        let raw = fs::read_to_string(path).await.map_err(|e| SettingsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&raw)
    }

    fn parse(raw: &str) -> Result<SessionSettings, SettingsError> {
        let doc: SettingsFile =
            toml::from_str(raw).map_err(|e| SettingsError::Toml { source: e })?;

        let mut settings = SessionSettings::default();
        let section = doc.session;

        if let Some(theme) = section.default_theme {
            let theme = theme.trim();
            if theme.is_empty() {
                return Err(SettingsError::InvalidField("default_theme".into()));
            }
            settings.default_theme = theme.to_string();
        }

        if let Some(raw_timer) = section.max_timer {
            settings.max_timer = humantime::parse_duration(&raw_timer).map_err(|e| {
                SettingsError::Duration {
                    field: "max_timer",
                    source: e,
                }
            })?;

            if settings.max_timer < MIN_MAX_TIMER {
                return Err(SettingsError::InvalidField("max_timer".into()));
            }
        }

        if let Some(n) = section.max_name_len {
            if n == 0 {
                return Err(SettingsError::InvalidField("max_name_len".into()));
            }
            settings.max_name_len = n;
        }

        if let Some(n) = section.max_message_len {
            if n == 0 {
                return Err(SettingsError::InvalidField("max_message_len".into()));
            }
            settings.max_message_len = n;
        }

        Ok(settings)
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    session: SessionSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SessionSection {
    #[serde(default)]
    default_theme: Option<String>,

    #[serde(default)]
    max_timer: Option<String>,

    #[serde(default)]
    max_name_len: Option<usize>,

    #[serde(default)]
    max_message_len: Option<usize>,
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid or missing field '{0}'")]
    InvalidField(String),

    #[error("bad duration for '{field}': {source}")]
    Duration {
        field: &'static str,
        source: humantime::DurationError,
    },

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
