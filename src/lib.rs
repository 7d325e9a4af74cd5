pub mod auth;
pub mod config;
pub mod errors;
pub mod frontend;
pub mod gateway;
pub mod server;
pub mod session;
pub mod shared_types;
pub mod timer;
pub mod wire;

pub use config::Config;
pub use frontend::connection::FrontendConnection;
pub use gateway::{Gateway, GatewayHandle};
pub use server::Server;
pub use session::SessionStore;
