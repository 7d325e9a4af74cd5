use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::shared_types::{ParticipantId, SessionId};

// -----------------------------------------------------------------------------
// ----- Outbound --------------------------------------------------------------

/// What the gateway hands a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A serialized JSON frame.
    Text(String),

    /// Send a close frame and stop writing.
    Close,
}

pub type Outbox = mpsc::UnboundedSender<Outbound>;

// -----------------------------------------------------------------------------
// ----- Peer ------------------------------------------------------------------

#[derive(Debug)]
pub struct Peer {
    /// Distinguishes connections that share an identity; only the newest one
    /// may act or disconnect.
    pub serial: u64,
    pub outbox: Outbox,
    /// The session this connection is attached to (its room).
    pub session: Option<SessionId>,
}

impl Peer {
    pub fn send(&self, frame: Outbound) -> bool {
        self.outbox.send(frame).is_ok()
    }
}

// -----------------------------------------------------------------------------
// ----- PeerTable -------------------------------------------------------------

#[derive(Debug, Default)]
pub struct PeerTable {
    by_id: HashMap<ParticipantId, Peer>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the connection this one supersedes, if any.
    pub fn register(&mut self, id: ParticipantId, serial: u64, outbox: Outbox) -> Option<Peer> {
        self.by_id.insert(
            id,
            Peer {
                serial,
                outbox,
                session: None,
            },
        )
    }

    /// Removes the peer only if `serial` still names the live connection.
    pub fn unregister(&mut self, id: &ParticipantId, serial: u64) -> Option<Peer> {
        if self.by_id.get(id)?.serial != serial {
            return None;
        }

        self.by_id.remove(id)
    }

    pub fn is_current(&self, id: &ParticipantId, serial: u64) -> bool {
        self.by_id.get(id).is_some_and(|p| p.serial == serial)
    }

    pub fn session_of(&self, id: &ParticipantId) -> Option<&SessionId> {
        self.by_id.get(id)?.session.as_ref()
    }

    pub fn attach(&mut self, id: &ParticipantId, session: SessionId) {
        if let Some(peer) = self.by_id.get_mut(id) {
            peer.session = Some(session);
        }
    }

    pub fn detach(&mut self, id: &ParticipantId) {
        if let Some(peer) = self.by_id.get_mut(id) {
            peer.session = None;
        }
    }

    /// Empties the room. Returns who was in it.
    pub fn detach_all(&mut self, session: &SessionId) -> Vec<ParticipantId> {
        let mut detached = Vec::new();

        for (id, peer) in self.by_id.iter_mut() {
            if peer.session.as_ref() == Some(session) {
                peer.session = None;
                detached.push(id.clone());
            }
        }

        detached
    }

    pub fn in_session<'a>(&'a self, session: &'a SessionId) -> impl Iterator<Item = &'a Peer> + 'a {
        self.by_id
            .values()
            .filter(move |p| p.session.as_ref() == Some(session))
    }

    pub fn send_to(&self, id: &ParticipantId, frame: Outbound) -> bool {
        self.by_id.get(id).is_some_and(|p| p.send(frame))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
