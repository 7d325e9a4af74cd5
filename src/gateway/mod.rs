pub mod dispatcher;
pub mod handle;
pub mod peers;

pub use dispatcher::Gateway;
pub use handle::{GatewayHandle, GatewayMessage};
pub use peers::{Outbound, Outbox, Peer, PeerTable};

// Session orchestration; keep socket and framing code in frontend/wire.
