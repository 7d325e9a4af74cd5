use std::sync::Arc;

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use pokercrab::auth::{Anonymous, Authenticator};
use pokercrab::config::TokensConfig;
use pokercrab::{Config, Gateway, Server, SessionStore};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "🦀 pokercrab";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> std::io::Result<()> {
    setup().await;
    run_forever().await
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

async fn setup() {
    // This has to be the first thing we do, because it initializes the config
    Config::init().await;

    init_tracing();
}

fn init_tracing() {
    let config = Config::snapshot();
    let filter = EnvFilter::try_new(config.log_level.as_str())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

async fn load_authenticator() -> Arc<dyn Authenticator> {
    let config = Config::snapshot();

    let Some(path) = config.tokens_file_location else {
        info!("no tokens file; every connection starts anonymous");
        return Arc::new(Anonymous);
    };

    let tokens = TokensConfig::load(&path)
        .await
        .unwrap_or_else(|e| panic!("failed to load tokens: {e}"));

    info!("loaded {} tokens from {}", tokens.len(), path.display());
    spawn_reload_on_hangup(tokens.clone());

    Arc::new(tokens)
}

#[cfg(unix)]
fn spawn_reload_on_hangup(tokens: TokensConfig) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!("SIGHUP reload unavailable: {e}");
            return;
        }
    };

    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            let Some(path) = Config::snapshot().tokens_file_location else {
                continue;
            };

            tokens.reload(&path).await;
            info!("tokens reloaded ({} entries)", tokens.len());
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_tokens: TokensConfig) {}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run_forever() -> std::io::Result<()> {
    // Config might reload, but the fields used by run_forever are set at startup
    let config = Config::snapshot();

    let authenticator = load_authenticator().await;
    let (gateway, gateway_task) = Gateway::spawn(SessionStore::new(), config.session.clone());

    let server = Server::bind(config.listen_addr, gateway, authenticator)?;

    info!("{} listening on {}", APP_NAME, server.local_addr()?);

    server
        .run_until(async {
            let _ = signal::ctrl_c().await;
        })
        .await?;

    info!("{} shutting down", APP_NAME);
    gateway_task.abort();

    Ok(())
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
