use clap::Parser;
use parking_lot::RwLock;
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use super::types::LogLevel;

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static CLI_CONFIG: OnceLock<Arc<RwLock<CliConfig>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- CliConfig -------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct CliConfig {
    pub listen_addr: SocketAddr,
    pub config_file_location: Option<PathBuf>,
    pub tokens_file_location: Option<PathBuf>,
    pub log_level: LogLevel,
}

impl CliConfig {
    pub fn init() {
        CLI_CONFIG.get_or_init(|| {
            let cfg = Self::from_args();
            cfg.validate();
            Arc::new(RwLock::new(cfg))
        });
    }

    pub fn snapshot() -> CliConfig {
        handle().read().clone()
    }
}

// -----------------------------------------------------------------------------
// ----- CliConfig: Private ----------------------------------------------------

impl CliConfig {
    fn from_args() -> Self {
        let args = Args::try_parse().unwrap_or_else(|e| panic!("Invalid CLI/ENV: {e}"));

        Self {
            listen_addr: SocketAddr::from((args.host, args.port)),
            config_file_location: args.config_file,
            tokens_file_location: args.tokens_file,
            log_level: args.log_level,
        }
    }

    fn validate(&self) {
        if let Some(path) = &self.config_file_location {
            must_exist_file(path, "--config / pokercrab.toml");
        }

        if let Some(path) = &self.tokens_file_location {
            must_exist_file(path, "--tokens / tokens.toml");
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "pokercrab", version, about = "Planning poker session server")]
struct Args {
    // IPv4 or IPv6 literal (e.g., 0.0.0.0, 127.0.0.1, ::, ::1).
    #[arg(long = "host", short = 'H', env = "POKERCRAB_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(long = "port", short = 'p', env = "POKERCRAB_PORT", default_value_t = 3000)]
    port: u16,

    // Not required via CLI or ENV (defaults to info).
    #[arg(long = "log", env = "POKERCRAB_LOG", default_value = "info")]
    log_level: LogLevel,

    // Optional; must exist when given.
    #[arg(long = "config", env = "POKERCRAB_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    // Optional; without it every connection starts anonymous.
    #[arg(long = "tokens", env = "POKERCRAB_TOKENS_FILE")]
    tokens_file: Option<PathBuf>,
}

// -----------------------------------------------------------------------------
// ----- Private Utils ---------------------------------------------------------

fn handle() -> Arc<RwLock<CliConfig>> {
    CLI_CONFIG
        .get()
        .expect("config not initialized; call config::init().await first")
        .clone()
}

fn must_exist_file(path: &Path, hint: &str) {
    let md = fs::metadata(path).unwrap_or_else(|_| {
        panic!("required file missing: {} (from {hint})", path.display());
    });

    if !md.is_file() {
        panic!("path is not a file: {} (from {hint})", path.display());
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
