use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::SessionError;
use crate::shared_types::{ParticipantId, SessionId};

use super::chat::ChatMessage;
use super::participant::{Participant, RosterEntry};
use super::round::{RevealOutcome, Round, Vote};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const UNKNOWN_PARTICIPANT: &str = "Unknown";

// -----------------------------------------------------------------------------
// ----- RevealedVote ----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealedVote {
    pub user_id: ParticipantId,
    pub username: String,
    pub vote: String,
}

// -----------------------------------------------------------------------------
// ----- RoundSummary ----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSummary {
    pub round_number: u64,
    pub votes: Vec<RevealedVote>,
    pub timestamp: DateTime<Utc>,
}

// -----------------------------------------------------------------------------
// ----- JoinOutcome -----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub is_creator: bool,
    pub rejoined: bool,
}

// -----------------------------------------------------------------------------
// ----- Session ---------------------------------------------------------------

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    creator: Option<ParticipantId>,
    theme: String,
    participants: Vec<Participant>,
    round: Round,
    history: Vec<RoundSummary>,
    chat: Vec<ChatMessage>,
}

// -----------------------------------------------------------------------------
// ----- Session: Static -------------------------------------------------------

impl Session {
    pub fn new(id: SessionId, theme: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            creator: None,
            theme: theme.into(),
            participants: Vec::new(),
            round: Round::new(),
            history: Vec::new(),
            chat: Vec::new(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Queries ------------------------------------------------------

impl Session {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn creator(&self) -> Option<&ParticipantId> {
        self.creator.as_ref()
    }

    pub fn is_creator(&self, participant: &ParticipantId) -> bool {
        self.creator.as_ref() == Some(participant)
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }

    pub fn is_member(&self, id: &ParticipantId) -> bool {
        self.participant(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.participants
            .iter()
            .map(|p| RosterEntry {
                participant: p.clone(),
                is_creator: self.is_creator(&p.id),
            })
            .collect()
    }

    pub fn round(&self) -> &Round {
        &self.round
    }

    pub fn round_mut(&mut self) -> &mut Round {
        &mut self.round
    }

    pub fn history(&self) -> &[RoundSummary] {
        &self.history
    }

    pub fn chat_messages(&self) -> &[ChatMessage] {
        &self.chat
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Membership ---------------------------------------------------

impl Session {
    /// The first participant of an empty session becomes its creator. A repeat
    /// join with the same identity updates the display name in place.
    pub fn join(
        &mut self,
        id: ParticipantId,
        username: impl Into<String>,
        now: DateTime<Utc>,
    ) -> JoinOutcome {
        if self.participants.is_empty() {
            self.creator = Some(id.clone());
        }

        let username = username.into();
        let rejoined = match self.participants.iter_mut().find(|p| p.id == id) {
            Some(existing) => {
                existing.username = username;
                existing.connected = true;
                true
            }
            None => {
                self.participants
                    .push(Participant::new(id.clone(), username, now));
                false
            }
        };

        JoinOutcome {
            is_creator: self.is_creator(&id),
            rejoined,
        }
    }

    /// Returns whether the participant was present.
    pub fn leave(&mut self, id: &ParticipantId) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| &p.id != id);
        before != self.participants.len()
    }

    pub fn set_theme(&mut self, theme: impl Into<String>) {
        self.theme = theme.into();
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Rounds -------------------------------------------------------

impl Session {
    pub fn start_voting(&mut self, duration_secs: u64, now: DateTime<Utc>) -> u64 {
        self.round.start(duration_secs, now)
    }

    pub fn submit_vote(
        &mut self,
        participant: &ParticipantId,
        value: impl Into<String>,
    ) -> Result<(), SessionError> {
        if !self.is_member(participant) {
            return Err(SessionError::NotMember);
        }

        self.round.submit_vote(participant, value)
    }

    pub fn reveal_votes(&mut self) -> RevealOutcome<Vec<RevealedVote>> {
        match self.round.reveal() {
            RevealOutcome::Revealed(votes) => RevealOutcome::Revealed(self.resolve(&votes)),
            RevealOutcome::AlreadyRevealed => RevealOutcome::AlreadyRevealed,
            RevealOutcome::Inactive => RevealOutcome::Inactive,
        }
    }

    /// Returns whether a summary was archived.
    pub fn reset_round(&mut self, now: DateTime<Utc>) -> bool {
        let round_number = self.round.sequence();

        let Some(votes) = self.round.reset() else {
            return false;
        };

        let votes = self.resolve(&votes);
        self.history.push(RoundSummary {
            round_number,
            votes,
            timestamp: now,
        });

        true
    }

    pub fn add_chat_message(
        &mut self,
        author: &ParticipantId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatMessage, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::InvalidField("message"));
        }

        let Some(participant) = self.participant(author) else {
            return Err(SessionError::NotMember);
        };

        let message = ChatMessage::new(author.clone(), participant.username.clone(), text, now);
        self.chat.push(message.clone());

        Ok(message)
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Private ------------------------------------------------------

impl Session {
    fn resolve(&self, votes: &[Vote]) -> Vec<RevealedVote> {
        votes
            .iter()
            .map(|v| RevealedVote {
                user_id: v.participant.clone(),
                username: self
                    .participant(&v.participant)
                    .map(|p| p.username.clone())
                    .unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string()),
                vote: v.value.clone(),
            })
            .collect()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::round::RoundPhase;

    fn pid(raw: &str) -> ParticipantId {
        ParticipantId::new(raw)
    }

    fn session() -> Session {
        Session::new(SessionId::parse("0A0B0C0D").unwrap(), "modern", Utc::now())
    }

    #[test]
    fn first_joiner_is_creator() {
        let mut s = session();

        let alice = s.join(pid("alice"), "Alice", Utc::now());
        let bob = s.join(pid("bob"), "Bob", Utc::now());

        assert!(alice.is_creator);
        assert!(!bob.is_creator);

        let roster = s.roster();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].participant.username, "Alice");
        assert!(roster[0].is_creator);
        assert!(!roster[1].is_creator);
    }

    #[test]
    fn rejoin_updates_name_in_place() {
        let mut s = session();
        s.join(pid("alice"), "Alice", Utc::now());
        s.join(pid("bob"), "Bob", Utc::now());

        let outcome = s.join(pid("alice"), "Alice B.", Utc::now());
        assert!(outcome.rejoined);
        assert!(outcome.is_creator);
        assert_eq!(s.participants()[0].username, "Alice B.");
        assert_eq!(s.participants().len(), 2);
    }

    #[test]
    fn non_members_cannot_vote_or_chat() {
        let mut s = session();
        s.join(pid("alice"), "Alice", Utc::now());
        s.start_voting(0, Utc::now());

        assert_eq!(
            s.submit_vote(&pid("mallory"), "1"),
            Err(SessionError::NotMember)
        );
        assert_eq!(
            s.add_chat_message(&pid("mallory"), "hi", Utc::now())
                .unwrap_err(),
            SessionError::NotMember
        );
    }

    #[test]
    fn reveal_resolves_names_and_skips_non_voters() {
        let mut s = session();
        s.join(pid("alice"), "Alice", Utc::now());
        s.join(pid("bob"), "Bob", Utc::now());

        s.start_voting(0, Utc::now());
        s.submit_vote(&pid("bob"), "5").unwrap();

        let RevealOutcome::Revealed(votes) = s.reveal_votes() else {
            panic!("expected first reveal");
        };
        assert_eq!(
            votes,
            vec![RevealedVote {
                user_id: pid("bob"),
                username: "Bob".into(),
                vote: "5".into(),
            }]
        );
        assert_eq!(s.reveal_votes(), RevealOutcome::AlreadyRevealed);
    }

    #[test]
    fn departed_voter_shows_as_unknown() {
        let mut s = session();
        s.join(pid("alice"), "Alice", Utc::now());
        s.join(pid("bob"), "Bob", Utc::now());
        s.start_voting(0, Utc::now());
        s.submit_vote(&pid("bob"), "8").unwrap();
        s.leave(&pid("bob"));

        let RevealOutcome::Revealed(votes) = s.reveal_votes() else {
            panic!("expected first reveal");
        };
        assert_eq!(votes[0].username, "Unknown");
    }

    #[test]
    fn reset_archives_into_history() {
        let mut s = session();
        s.join(pid("alice"), "Alice", Utc::now());
        s.join(pid("bob"), "Bob", Utc::now());

        s.start_voting(0, Utc::now());
        s.submit_vote(&pid("bob"), "5").unwrap();
        s.reveal_votes();
        assert!(s.reset_round(Utc::now()));

        assert_eq!(s.history().len(), 1);
        assert_eq!(s.history()[0].round_number, 1);
        assert_eq!(s.history()[0].votes[0].vote, "5");
        assert_eq!(s.round().phase(), RoundPhase::Idle);
        assert_eq!(s.round().sequence(), 1);

        // Reset of an idle round adds nothing.
        assert!(!s.reset_round(Utc::now()));
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn chat_trims_and_denormalizes_author() {
        let mut s = session();
        s.join(pid("alice"), "Alice", Utc::now());

        let msg = s
            .add_chat_message(&pid("alice"), "  hello  ", Utc::now())
            .unwrap();
        assert_eq!(msg.message, "hello");
        assert_eq!(msg.username, "Alice");

        assert_eq!(
            s.add_chat_message(&pid("alice"), "   ", Utc::now())
                .unwrap_err(),
            SessionError::InvalidField("message")
        );
        assert_eq!(s.chat_messages().len(), 1);
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
