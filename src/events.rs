//! Inbound event stream (§4.7) and outbound UI event tagged union (§6.2).

use serde::{Deserialize, Serialize};

use crate::domain::card::{Card, Rating};
use crate::domain::voice_state::RatingDistribution;
use crate::domain::EvaluationResult;

/// A button the client can press, routed the same way as a parsed voice
/// command (§4.7 `Event::Button`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonCommand {
    Hint,
    GiveUp,
    Next,
    Stop,
    Skip,
    Undo,
    Mnemonic,
    Question,
}

/// Push-to-talk gating events from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PttEvent {
    Start,
    End,
    Cancel,
}

/// Timer ticks the session driver schedules itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    SilenceTick,
    InactivityTick,
}

/// The orchestrator's single inbound event type (§4.7). Exhaustively
/// matched in the event loop so a missing handler is a compile error.
#[derive(Debug, Clone)]
pub enum Event {
    AudioChunk(Vec<u8>),
    FinalTranscript { text: String, confidence: f32 },
    UserText(String),
    Button(ButtonCommand),
    Ptt(PttEvent),
    TtsDone,
    /// A background evaluation call has completed (§4.7 concurrency
    /// policy: side effects report back as events, the loop never blocks).
    EvaluationReady(Box<EvaluationResult>),
    Timer(TimerKind),
    /// An explicit rating from the REST `POST /cards/{id}/rate` endpoint
    /// (§6.1), bypassing the voice command parser entirely.
    ManualRating(Rating),
}

/// Where a transcript came from, for `user_transcript` events (§6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    Voice,
    Text,
}

/// A card as published to the client — sanitized, with progress attached.
#[derive(Debug, Clone, Serialize)]
pub struct CardPayload {
    pub id: u64,
    pub question_html: String,
    pub answer_html: String,
    pub deck_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Review progress attached to several event kinds.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Progress {
    pub cards_reviewed: usize,
    pub cards_remaining: usize,
}

/// Session-end statistics (§6.1 `/session/end`, §6.2 `session_complete`).
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub cards_reviewed: usize,
    pub ratings: RatingDistribution,
    pub synced_count: u32,
    pub failed_count: u32,
    pub duration_minutes: f64,
}

/// The typed outbound event union published over the realtime data channel
/// (§6.2), topic `agent-response`. `#[serde(tag = "type")]` gives the exact
/// wire shape the spec's literal JSON examples show.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    Card {
        card: CardPayload,
        progress: Progress,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_rating: Option<u8>,
    },
    RatingResult {
        rating: u8,
        feedback: String,
        card_back: String,
        answer_summary: String,
        progress: Progress,
    },
    RevealAnswer {
        card_back: String,
        progress: Progress,
    },
    AgentMessage {
        text: String,
        id: String,
    },
    UserTranscript {
        text: String,
        source: TranscriptSource,
    },
    AgentSpeakingState {
        speaking: bool,
    },
    PttState {
        recording: bool,
    },
    SessionComplete {
        stats: SessionStats,
    },
    Error {
        message: String,
    },
}

impl From<&Card> for CardPayload {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id,
            question_html: crate::sanitizer::sanitize_question(&card.question),
            answer_html: crate::sanitizer::sanitize_answer(&card.answer),
            deck_name: card.deck_name.clone(),
            image_url: card.image_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_event_serializes_with_type_tag() {
        let event = UiEvent::Card {
            card: CardPayload {
                id: 42,
                question_html: "Capital of France?".into(),
                answer_html: "Paris".into(),
                deck_name: "Capitals".into(),
                image_url: None,
            },
            progress: Progress { cards_reviewed: 0, cards_remaining: 1 },
            last_rating: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "card");
        assert_eq!(json["card"]["id"], 42);
        assert!(json.get("last_rating").is_none());
    }

    #[test]
    fn user_transcript_serializes_source_as_snake_case() {
        let event = UiEvent::UserTranscript { text: "Paris".into(), source: TranscriptSource::Voice };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["source"], "voice");
    }

    #[test]
    fn error_event_tag_is_error() {
        let event = UiEvent::Error { message: "boom".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
    }
}
