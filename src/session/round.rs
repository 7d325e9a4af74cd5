use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::SessionError;
use crate::shared_types::ParticipantId;
use crate::timer::RevealTimer;

// -----------------------------------------------------------------------------
// ----- RoundPhase ------------------------------------------------------------

/// The three observable phases of a round.
///
/// - `Idle`: no round running, or the last one was reset.
/// - `Voting`: votes are accepted and withheld.
/// - `Revealed`: votes are frozen and visible to everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Idle,
    Voting,
    Revealed,
}

// -----------------------------------------------------------------------------
// ----- Vote ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub participant: ParticipantId,
    pub value: String,
}

// -----------------------------------------------------------------------------
// ----- RoundTimer ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTimer {
    pub duration_secs: u64,
    pub started_at: DateTime<Utc>,
}

// -----------------------------------------------------------------------------
// ----- RevealOutcome ---------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
pub enum RevealOutcome<T> {
    /// First reveal of this round; carries what has to be broadcast.
    Revealed(T),

    /// The round was already revealed. Nothing to broadcast.
    AlreadyRevealed,

    /// No round is running.
    Inactive,
}

// -----------------------------------------------------------------------------
// ----- Round -----------------------------------------------------------------

#[derive(Debug)]
pub struct Round {
    sequence: u64,
    state: RoundState,
}

#[derive(Debug)]
enum RoundState {
    Idle,
    Voting {
        votes: Vec<Vote>,
        timer: Option<RoundTimer>,
        pending_reveal: Option<RevealTimer>,
    },
    Revealed {
        votes: Vec<Vote>,
        timer: Option<RoundTimer>,
    },
}

// -----------------------------------------------------------------------------
// ----- Round: Static ---------------------------------------------------------

impl Round {
    pub fn new() -> Self {
        Self {
            sequence: 0,
            state: RoundState::Idle,
        }
    }
}

impl Default for Round {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// ----- Round: Queries --------------------------------------------------------

impl Round {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn phase(&self) -> RoundPhase {
        match self.state {
            RoundState::Idle => RoundPhase::Idle,
            RoundState::Voting { .. } => RoundPhase::Voting,
            RoundState::Revealed { .. } => RoundPhase::Revealed,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, RoundState::Idle)
    }

    pub fn timer(&self) -> Option<RoundTimer> {
        match &self.state {
            RoundState::Idle => None,
            RoundState::Voting { timer, .. } | RoundState::Revealed { timer, .. } => *timer,
        }
    }

    pub fn votes(&self) -> &[Vote] {
        match &self.state {
            RoundState::Idle => &[],
            RoundState::Voting { votes, .. } | RoundState::Revealed { votes, .. } => votes,
        }
    }

    pub fn has_voted(&self, participant: &ParticipantId) -> bool {
        self.votes().iter().any(|v| &v.participant == participant)
    }

    pub fn has_pending_reveal(&self) -> bool {
        matches!(
            self.state,
            RoundState::Voting {
                pending_reveal: Some(_),
                ..
            }
        )
    }
}

// -----------------------------------------------------------------------------
// ----- Round: Transitions ----------------------------------------------------

impl Round {
    /// Any phase -> Voting. Unrevealed votes of a running round are discarded.
    pub fn start(&mut self, duration_secs: u64, now: DateTime<Utc>) -> u64 {
        self.cancel_pending_reveal();

        self.sequence += 1;

        let timer = (duration_secs > 0).then_some(RoundTimer {
            duration_secs,
            started_at: now,
        });

        self.state = RoundState::Voting {
            votes: Vec::new(),
            timer,
            pending_reveal: None,
        };

        self.sequence
    }

    /// Last write wins; the first submission keeps its position.
    pub fn submit_vote(
        &mut self,
        participant: &ParticipantId,
        value: impl Into<String>,
    ) -> Result<(), SessionError> {
        let RoundState::Voting { votes, .. } = &mut self.state else {
            return Err(SessionError::NotVoting);
        };

        let value = value.into();
        match votes.iter_mut().find(|v| &v.participant == participant) {
            Some(existing) => existing.value = value,
            None => votes.push(Vote {
                participant: participant.clone(),
                value,
            }),
        }

        Ok(())
    }

    pub fn reveal(&mut self) -> RevealOutcome<Vec<Vote>> {
        match std::mem::replace(&mut self.state, RoundState::Idle) {
            RoundState::Voting {
                votes,
                timer,
                pending_reveal,
            } => {
                if let Some(pending) = pending_reveal {
                    pending.cancel();
                }

                let revealed = votes.clone();
                self.state = RoundState::Revealed { votes, timer };
                RevealOutcome::Revealed(revealed)
            }
            already @ RoundState::Revealed { .. } => {
                self.state = already;
                RevealOutcome::AlreadyRevealed
            }
            RoundState::Idle => RevealOutcome::Inactive,
        }
    }

    /// Back to Idle, keeping the sequence. Returns the votes of a revealed
    /// round that had any, so the caller can archive them.
    pub fn reset(&mut self) -> Option<Vec<Vote>> {
        self.cancel_pending_reveal();

        match std::mem::replace(&mut self.state, RoundState::Idle) {
            RoundState::Revealed { votes, .. } if !votes.is_empty() => Some(votes),
            _ => None,
        }
    }

    /// Stores the deferred reveal for the running round. Outside of Voting the
    /// handle is cancelled right away.
    pub fn attach_reveal_timer(&mut self, handle: RevealTimer) {
        match &mut self.state {
            RoundState::Voting { pending_reveal, .. } => {
                if let Some(previous) = pending_reveal.replace(handle) {
                    previous.cancel();
                }
            }
            _ => handle.cancel(),
        }
    }

    pub fn cancel_pending_reveal(&mut self) {
        if let RoundState::Voting { pending_reveal, .. } = &mut self.state {
            if let Some(pending) = pending_reveal.take() {
                pending.cancel();
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
