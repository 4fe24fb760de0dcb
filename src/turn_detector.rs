//! Turn detection: decide when the listener should stop waiting (§4.2 Turn
//! Detector).
//!
//! Pure function of the latest transcript, elapsed silence, and how many
//! clarification rounds this card has already used. No I/O.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::domain::Transcript;

/// Silence after which an utterance is considered finished, absent other
/// signals.
pub const UTTERANCE_END_MS: u64 = 300;
/// Silence after which a "thinking" pause is assumed to be the learner
/// composing a longer answer.
pub const THINKING_MS: u64 = 2_000;
/// Base inactivity timeout while listening.
pub const BASE_TIMEOUT_MS: u64 = 30_000;
/// Extended timeout when engagement (filler words, Socratic mode) is
/// detected.
pub const EXTENDED_TIMEOUT_MS: u64 = 60_000;
/// STT confidence floor below which a clarification request is warranted.
pub const CONFIDENCE_THRESHOLD: f32 = 0.7;
/// At most this many clarification rounds per card before proceeding with
/// whatever was heard.
pub const MAX_CLARIFICATIONS: u32 = 2;

static FILLER_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(um+|uh+|er+|hmm+)\b").expect("static regex"));

static DONE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(that'?s it|i'?m done|done|that'?s my answer|that'?s all)\b")
        .expect("static regex")
});

static CONTINUATION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(and also|and another thing|also|plus|one more thing)\b")
        .expect("static regex")
});

/// The turn detector's verdict for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// Keep the microphone open; nothing decisive has happened yet.
    Listening,
    /// The learner appears to still be composing their answer.
    Thinking,
    /// The utterance is complete; hand it to evaluation.
    UtteranceComplete,
    /// Silence exceeded the active timeout.
    Timeout,
    /// Confidence was too low; ask the learner to repeat (bounded by
    /// [`MAX_CLARIFICATIONS`]).
    NeedsClarification,
}

/// Inputs the turn detector reasons over for one tick.
#[derive(Debug, Clone, Copy)]
pub struct TurnDetectorInput<'a> {
    pub transcript: Option<&'a Transcript>,
    pub silence: Duration,
    pub clarifications_used: u32,
    /// `true` when inside Socratic follow-up — engagement is presumed, so
    /// the extended timeout applies.
    pub in_socratic_mode: bool,
}

/// `true` when `text` contains a filler word, a signal of active
/// engagement rather than silence-before-giving-up.
#[must_use]
pub fn has_filler_word(text: &str) -> bool {
    FILLER_WORD.is_match(text)
}

/// Decide the turn status for the current tick (§4.2).
#[must_use]
pub fn detect_turn(input: TurnDetectorInput<'_>) -> TurnStatus {
    let engaged = input.in_socratic_mode
        || input
            .transcript
            .is_some_and(|t| has_filler_word(&t.text));
    let timeout_ms = if engaged {
        EXTENDED_TIMEOUT_MS
    } else {
        BASE_TIMEOUT_MS
    };

    if let Some(transcript) = input.transcript {
        if DONE_MARKER.is_match(&transcript.text) {
            return TurnStatus::UtteranceComplete;
        }
        if CONTINUATION_MARKER.is_match(&transcript.text) {
            if input.silence >= Duration::from_millis(THINKING_MS) {
                return TurnStatus::UtteranceComplete;
            }
            return TurnStatus::Thinking;
        }
        if transcript.needs_clarification() && input.clarifications_used < MAX_CLARIFICATIONS {
            return TurnStatus::NeedsClarification;
        }
    }

    if input.silence >= Duration::from_millis(timeout_ms) {
        return TurnStatus::Timeout;
    }

    if input.silence >= Duration::from_millis(THINKING_MS) {
        return TurnStatus::UtteranceComplete;
    }

    if input.silence >= Duration::from_millis(UTTERANCE_END_MS) && input.transcript.is_some() {
        return TurnStatus::UtteranceComplete;
    }

    TurnStatus::Listening
}
