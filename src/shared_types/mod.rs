pub mod participant_id;
pub mod session_id;

pub use participant_id::ParticipantId;
pub use session_id::SessionId;
