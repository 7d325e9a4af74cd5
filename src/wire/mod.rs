pub mod inbound;
pub mod outbound;

pub use inbound::{ClientCommand, Inbound, decode};
pub use outbound::{AckFrame, JoinAck, ServerEvent};
