//! Transcript types produced by the STT port (§3 Transcript).

use serde::{Deserialize, Serialize};

/// A transcription result, either partial (streaming) or final.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
    pub is_final: bool,
    #[serde(default)]
    pub segments: Vec<String>,
}

/// Coarse confidence bucket derived from [`Transcript::confidence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl Transcript {
    #[must_use]
    pub fn confidence_level(&self) -> ConfidenceLevel {
        if self.confidence >= 0.9 {
            ConfidenceLevel::High
        } else if self.confidence >= 0.7 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    /// `true` when the transcript is too uncertain to act on without asking
    /// the learner to repeat themselves.
    #[must_use]
    pub fn needs_clarification(&self) -> bool {
        self.confidence_level() == ConfidenceLevel::Low
    }
}
