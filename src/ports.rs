//! Port traits for the external collaborators this crate treats as given
//! (§1 Out of scope, §6.3 LLM port, §6.4 Flashcard store port).
//!
//! The orchestrator and its services depend only on these traits; concrete
//! HTTP-backed and in-memory implementations live under `src/adapters/`.
//! Mirrors the teacher's `ProviderAdapter` pattern: a small `async_trait`
//! per external system, boxed as `Arc<dyn Port>` at the call site.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::card::{Card, Rating};
use crate::error::Result;

/// A fully-formed request to grade one answer attempt (§6.3 `evaluate`).
#[derive(Debug, Clone, Serialize)]
pub struct EvaluateRequest<'a> {
    pub question: &'a str,
    pub expected: &'a str,
    pub transcript: &'a str,
    pub response_time_s: f32,
    pub hints_used: u32,
    pub socratic_context: &'a [String],
}

/// The LLM's raw evaluate response, before domain overrides (§4.4) are
/// applied by the evaluation service.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvaluation {
    pub reasoning: String,
    #[serde(default)]
    pub corrected_transcript: Option<String>,
    pub is_correct: bool,
    pub fluency: u8,
    pub rating: u8,
    pub feedback: String,
    pub enter_socratic: bool,
    #[serde(default)]
    pub socratic_prompt: Option<String>,
    pub answer_summary: String,
}

/// One of the three hint depths (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintType {
    Contextual,
    Deeper,
    Reveal,
}

/// A generated hint (§6.3 `generate_hint`).
#[derive(Debug, Clone, Deserialize)]
pub struct HintResponse {
    pub hint: String,
    pub hint_type: HintType,
}

/// A one-sentence "why this matters" (§6.3 `explain_answer`).
#[derive(Debug, Clone, Deserialize)]
pub struct ExplanationResponse {
    pub summary: String,
}

/// The LLM port: evaluate / hint / explain. Implementations MUST return
/// structured responses matching these schemas (§6.3); callers apply the
/// domain overrides themselves.
#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn evaluate(&self, request: EvaluateRequest<'_>) -> Result<RawEvaluation>;

    #[allow(clippy::too_many_arguments)]
    async fn generate_hint(
        &self,
        question: &str,
        answer: &str,
        level: u32,
        previous_hints: &[String],
        user_attempts: &[String],
        socratic_context: &[String],
        evaluation_gap: Option<&str>,
    ) -> Result<HintResponse>;

    async fn explain_answer(&self, question: &str, answer: &str) -> Result<ExplanationResponse>;
}

/// Deck summary as returned by `get_decks` / `get_decks_with_card_counts`
/// (§6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckSummary {
    pub name: String,
    pub new: u32,
    pub learn: u32,
    pub due: u32,
    pub total: u32,
}

/// The flashcard store port (§6.4). `submit_review` MUST be idempotent
/// w.r.t. `(card_id, session_id)` within a short window, or the sync
/// orchestrator must tolerate duplicate writes.
#[async_trait]
pub trait FlashcardStore: Send + Sync {
    async fn get_decks(&self) -> Result<Vec<DeckSummary>>;

    async fn get_decks_with_card_counts(&self) -> Result<Vec<DeckSummary>>;

    /// Cards due for review in `deck`, ordered learning, due, new, and
    /// deduplicated by id.
    async fn get_reviewable_cards(&self, deck: &str) -> Result<Vec<Card>>;

    async fn submit_review(&self, card_id: u64, session_id: &str, rating: Rating) -> Result<()>;

    async fn get_card_image(&self, filename: &str) -> Result<Vec<u8>>;
}

/// The speech-to-text port. Out of scope per §1; defined only so the
/// orchestrator's transport layer has a stable seam to call through.
#[async_trait]
pub trait SttPort: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<crate::domain::Transcript>;
}

/// The text-to-speech port. Out of scope per §1; same seam role as
/// [`SttPort`].
#[async_trait]
pub trait TtsPort: Send + Sync {
    /// Synthesize `text` to audio bytes. Implementations should be
    /// cancel-safe: the orchestrator drops the future on barge-in.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}
