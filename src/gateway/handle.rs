use tokio::sync::mpsc;

use crate::auth::AuthContext;
use crate::shared_types::{ParticipantId, SessionId};
use crate::wire::Inbound;

use super::peers::Outbox;

// -----------------------------------------------------------------------------
// ----- GatewayMessage --------------------------------------------------------

/// Everything the gateway reacts to. All of it goes through one channel, so
/// every session mutation happens in arrival order on a single task.
#[derive(Debug)]
pub enum GatewayMessage {
    Connected {
        participant: ParticipantId,
        serial: u64,
        outbox: Outbox,
        auth: Option<AuthContext>,
    },

    Command {
        participant: ParticipantId,
        serial: u64,
        inbound: Inbound,
    },

    Disconnected {
        participant: ParticipantId,
        serial: u64,
    },

    RevealTimerElapsed {
        session: SessionId,
        round: u64,
    },
}

// -----------------------------------------------------------------------------
// ----- GatewayHandle ---------------------------------------------------------

/// Cheap to clone; one per connection task.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    tx: mpsc::UnboundedSender<GatewayMessage>,
}

impl GatewayHandle {
    pub fn channel() -> (GatewayHandle, mpsc::UnboundedReceiver<GatewayMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (GatewayHandle { tx }, rx)
    }

    /// Returns false once the gateway has stopped.
    pub fn send(&self, message: GatewayMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    pub(crate) fn downgrade(&self) -> mpsc::WeakUnboundedSender<GatewayMessage> {
        self.tx.downgrade()
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
