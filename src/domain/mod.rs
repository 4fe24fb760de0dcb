//! Core domain types: cards, transcripts, evaluation results, voice state,
//! and the session lifecycle record. Pure data and pure transition
//! functions — no I/O, no async.

pub mod card;
pub mod evaluation;
pub mod session;
pub mod transcript;
pub mod voice_state;

pub use card::{Card, QueueClass, Rating};
pub use evaluation::EvaluationResult;
pub use session::{Session, SessionState};
pub use transcript::{ConfidenceLevel, Transcript};
pub use voice_state::{RatingDistribution, SocraticLine, VoiceState, MAX_SOCRATIC_TURNS};
