pub mod cli;
#[allow(clippy::module_inception)]
pub mod config;
pub mod settings;
pub mod tokens;
pub mod types;

pub use config::Config;
pub use settings::{SessionSettings, SettingsError};
pub use tokens::{TokensConfig, TokensError};
pub use types::LogLevel;
