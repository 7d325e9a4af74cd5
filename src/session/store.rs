use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info};

use crate::errors::SessionError;
use crate::shared_types::{ParticipantId, SessionId};

use super::chat::ChatMessage;
use super::round::RevealOutcome;
use super::session::{JoinOutcome, RevealedVote, Session};

// -----------------------------------------------------------------------------
// ----- LeaveOutcome ----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    SessionNotFound,
    NotMember,
    Left,
    /// The participant was the last one; the session is gone.
    SessionRemoved,
}

// -----------------------------------------------------------------------------
// ----- SessionStore ----------------------------------------------------------

/// Owns every live session. One instance per gateway; nothing global.
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
    next_id: Box<dyn FnMut() -> SessionId + Send>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ----- SessionStore: Static --------------------------------------------------

impl SessionStore {
    pub fn new() -> Self {
        Self::with_id_source(SessionId::random)
    }

    /// Lets callers decide how ids are drawn. Collisions are still resolved
    /// by the store.
    pub fn with_id_source<F>(source: F) -> Self
    where
        F: FnMut() -> SessionId + Send + 'static,
    {
        Self {
            sessions: HashMap::new(),
            next_id: Box::new(source),
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// ----- SessionStore: Lifecycle -----------------------------------------------

impl SessionStore {
    pub fn create_session(&mut self, creator_name: &str, theme: &str) -> SessionId {
        let id = self.fresh_id();

        let session = Session::new(id.clone(), theme, Utc::now());
        self.sessions.insert(id.clone(), session);

        info!("session {id} created by {creator_name} (theme: {theme})");
        id
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn exists(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Cancels a pending reveal before the session is dropped. Returns whether
    /// anything was removed.
    pub fn delete(&mut self, id: &SessionId) -> bool {
        let Some(mut session) = self.sessions.remove(id) else {
            return false;
        };

        session.round_mut().cancel_pending_reveal();
        info!("session {id} deleted");
        true
    }

    pub fn join(
        &mut self,
        id: &SessionId,
        participant: ParticipantId,
        username: &str,
    ) -> Result<JoinOutcome, SessionError> {
        let session = self.session_mut(id)?;
        let outcome = session.join(participant, username, Utc::now());

        info!("{username} joined session {id}");
        Ok(outcome)
    }

    pub fn leave(&mut self, id: &SessionId, participant: &ParticipantId) -> LeaveOutcome {
        let Some(session) = self.sessions.get_mut(id) else {
            return LeaveOutcome::SessionNotFound;
        };

        if !session.leave(participant) {
            return LeaveOutcome::NotMember;
        }

        debug!("participant {participant} left session {id}");

        if session.is_empty() {
            self.delete(id);
            return LeaveOutcome::SessionRemoved;
        }

        LeaveOutcome::Left
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// -----------------------------------------------------------------------------
// ----- SessionStore: Rounds --------------------------------------------------

impl SessionStore {
    pub fn start_voting(&mut self, id: &SessionId, duration_secs: u64) -> Result<u64, SessionError> {
        let session = self.session_mut(id)?;
        let sequence = session.start_voting(duration_secs, Utc::now());

        info!("voting started in session {id}, round {sequence}, timer {duration_secs}s");
        Ok(sequence)
    }

    pub fn submit_vote(
        &mut self,
        id: &SessionId,
        participant: &ParticipantId,
        value: &str,
    ) -> Result<(), SessionError> {
        self.session_mut(id)?.submit_vote(participant, value)
    }

    pub fn reveal_votes(
        &mut self,
        id: &SessionId,
    ) -> Result<RevealOutcome<Vec<RevealedVote>>, SessionError> {
        let outcome = self.session_mut(id)?.reveal_votes();

        if let RevealOutcome::Revealed(votes) = &outcome {
            info!("votes revealed in session {id} ({} votes)", votes.len());
        }

        Ok(outcome)
    }

    pub fn reset_round(&mut self, id: &SessionId) -> Result<(), SessionError> {
        let archived = self.session_mut(id)?.reset_round(Utc::now());

        debug!("round reset in session {id} (archived: {archived})");
        Ok(())
    }

    pub fn add_chat_message(
        &mut self,
        id: &SessionId,
        author: &ParticipantId,
        text: &str,
    ) -> Result<ChatMessage, SessionError> {
        self.session_mut(id)?
            .add_chat_message(author, text, Utc::now())
    }

    pub fn set_theme(&mut self, id: &SessionId, theme: &str) -> Result<(), SessionError> {
        self.session_mut(id)?.set_theme(theme);

        info!("session {id} theme set to {theme}");
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- SessionStore: Private -------------------------------------------------

impl SessionStore {
    fn session_mut(&mut self, id: &SessionId) -> Result<&mut Session, SessionError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    fn fresh_id(&mut self) -> SessionId {
        loop {
            let candidate = (self.next_id)();
            if !self.sessions.contains_key(&candidate) {
                return candidate;
            }

            debug!("session id {candidate} already taken, drawing another");
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
