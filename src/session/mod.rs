pub mod chat;
pub mod participant;
pub mod round;
#[allow(clippy::module_inception)]
pub mod session;
pub mod store;

pub use chat::ChatMessage;
pub use participant::{Participant, RosterEntry};
pub use round::{RevealOutcome, Round, RoundPhase, RoundTimer, Vote};
pub use session::{JoinOutcome, RevealedVote, RoundSummary, Session};
pub use store::{LeaveOutcome, SessionStore};
