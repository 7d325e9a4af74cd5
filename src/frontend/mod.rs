pub mod connection;

pub use connection::FrontendConnection;
