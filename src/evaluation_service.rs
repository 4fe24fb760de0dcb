//! Evaluation service: wraps the LLM evaluate port and applies domain
//! overrides (§4.4 Evaluation Service).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::domain::card::Rating;
use crate::domain::evaluation::EvaluationResult;
use crate::ports::{EvaluateRequest, LlmPort, RawEvaluation};

/// evaluate SHOULD complete within this budget (§4.4 latency contract).
pub const EVALUATE_SOFT_BUDGET: Duration = Duration::from_millis(500);
/// evaluate-then-publish MUST complete within this budget; breaches are
/// logged as a red flag, not rejected.
pub const EVALUATE_TO_PUBLISH_HARD_BUDGET: Duration = Duration::from_millis(1200);

/// A phrase the learner can say instead of answering to give up outright.
const SKIP_PHRASES: &[&str] = &["i don't know", "i dont know", "no idea", "pass", "skip it"];

/// Everything the evaluation service needs about the current attempt, beyond
/// the raw transcript text.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub question: &'a str,
    pub expected_answer: &'a str,
    pub response_time_s: f32,
    pub hints_used: u32,
    pub socratic_context: &'a [String],
}

/// Wraps [`LlmPort::evaluate`] with the short-circuits and domain overrides
/// from §4.4.
pub struct EvaluationService {
    llm: Arc<dyn LlmPort>,
}

impl EvaluationService {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmPort>) -> Self {
        Self { llm }
    }

    /// Evaluate one answer attempt, applying short-circuits and overrides.
    /// Never returns an error to the caller: LLM failures degrade to a
    /// graceful Hard rating (§7 transient path).
    pub async fn evaluate(
        &self,
        transcript: &str,
        context: EvaluationContext<'_>,
    ) -> EvaluationResult {
        if is_timeout_equivalent(transcript) {
            return EvaluationResult::short_circuit_no_worries();
        }

        let started = Instant::now();
        let mut result = match self.llm.evaluate(EvaluateRequest {
            question: context.question,
            expected: context.expected_answer,
            transcript,
            response_time_s: context.response_time_s,
            hints_used: context.hints_used,
            socratic_context: context.socratic_context,
        }).await {
            Ok(raw) => from_raw(raw),
            Err(err) => {
                warn!(error = %err, "evaluate call failed; degrading to graceful Hard rating");
                EvaluationResult::graceful_degradation()
            }
        };

        let elapsed = started.elapsed();
        if elapsed > EVALUATE_SOFT_BUDGET {
            info!(?elapsed, "evaluate exceeded the 500ms soft latency budget");
        }
        if elapsed > EVALUATE_TO_PUBLISH_HARD_BUDGET {
            warn!(?elapsed, "evaluate exceeded the 1200ms evaluate-then-publish budget");
        }

        result.apply_overrides(context.hints_used);
        result
    }
}

/// `true` when the transcript is empty or an explicit give-up phrase —
/// both short-circuit to Rating::Again without calling the LLM (§4.4).
fn is_timeout_equivalent(transcript: &str) -> bool {
    let trimmed = transcript.trim();
    if trimmed.is_empty() {
        return true;
    }
    let lowered = trimmed.to_lowercase();
    SKIP_PHRASES.iter().any(|phrase| lowered == *phrase)
}

/// `true` when the transcript is non-empty but every character is
/// punctuation (`"."`, `"..."`, `"?!"`) — rejected with "I didn't catch
/// that…" before ever reaching the LLM (§4.7 Input validation). A single
/// letter or digit is a valid answer and does not match this; a wholly
/// empty or whitespace-only transcript is handled separately by
/// [`is_timeout_equivalent`], not here.
#[must_use]
pub fn is_punctuation_only(transcript: &str) -> bool {
    let trimmed = transcript.trim();
    !trimmed.is_empty() && trimmed.chars().all(char::is_ascii_punctuation)
}

fn from_raw(raw: RawEvaluation) -> EvaluationResult {
    EvaluationResult {
        reasoning: raw.reasoning,
        corrected_transcript: raw.corrected_transcript,
        is_correct: raw.is_correct,
        fluency: raw.fluency,
        rating: Rating::from_u8(raw.rating).unwrap_or(Rating::Hard),
        feedback: raw.feedback,
        enter_socratic: raw.enter_socratic,
        socratic_prompt: raw.socratic_prompt,
        answer_summary: raw.answer_summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TutorError};
    use crate::ports::{ExplanationResponse, HintResponse, HintType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubLlm {
        response: RawEvaluation,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmPort for StubLlm {
        async fn evaluate(&self, _request: EvaluateRequest<'_>) -> Result<RawEvaluation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }

        async fn generate_hint(
            &self,
            _question: &str,
            _answer: &str,
            _level: u32,
            _previous_hints: &[String],
            _user_attempts: &[String],
            _socratic_context: &[String],
            _evaluation_gap: Option<&str>,
        ) -> Result<HintResponse> {
            unimplemented!("not exercised by evaluation_service tests")
        }

        async fn explain_answer(&self, _question: &str, _answer: &str) -> Result<ExplanationResponse> {
            unimplemented!("not exercised by evaluation_service tests")
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmPort for FailingLlm {
        async fn evaluate(&self, _request: EvaluateRequest<'_>) -> Result<RawEvaluation> {
            Err(TutorError::Llm("timeout".into()))
        }

        async fn generate_hint(
            &self,
            _question: &str,
            _answer: &str,
            _level: u32,
            _previous_hints: &[String],
            _user_attempts: &[String],
            _socratic_context: &[String],
            _evaluation_gap: Option<&str>,
        ) -> Result<HintResponse> {
            unimplemented!()
        }

        async fn explain_answer(&self, _question: &str, _answer: &str) -> Result<ExplanationResponse> {
            unimplemented!()
        }
    }

    fn context() -> EvaluationContext<'static> {
        EvaluationContext {
            question: "Capital of France?",
            expected_answer: "Paris",
            response_time_s: 3.0,
            hints_used: 0,
            socratic_context: &[],
        }
    }

    fn raw_correct() -> RawEvaluation {
        RawEvaluation {
            reasoning: "matches".into(),
            corrected_transcript: None,
            is_correct: true,
            fluency: 4,
            rating: 4,
            feedback: "Nice.".into(),
            enter_socratic: false,
            socratic_prompt: None,
            answer_summary: "Paris".into(),
        }
    }

    #[tokio::test]
    async fn empty_transcript_short_circuits_without_calling_llm() {
        let llm = Arc::new(StubLlm { response: raw_correct(), calls: AtomicUsize::new(0) });
        let service = EvaluationService::new(llm.clone());
        let result = service.evaluate("", context()).await;
        assert_eq!(result.rating, Rating::Again);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn give_up_phrase_short_circuits() {
        let llm = Arc::new(StubLlm { response: raw_correct(), calls: AtomicUsize::new(0) });
        let service = EvaluationService::new(llm.clone());
        let result = service.evaluate("I don't know", context()).await;
        assert_eq!(result.rating, Rating::Again);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn real_answer_calls_llm_and_applies_overrides() {
        let llm = Arc::new(StubLlm { response: raw_correct(), calls: AtomicUsize::new(0) });
        let service = EvaluationService::new(llm.clone());
        let result = service.evaluate("Paris", context()).await;
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
        assert!(result.is_correct);
        assert!(result.rating >= Rating::Good);
    }

    #[tokio::test]
    async fn hints_used_clamps_rating_via_overrides() {
        let llm = Arc::new(StubLlm { response: raw_correct(), calls: AtomicUsize::new(0) });
        let service = EvaluationService::new(llm.clone());
        let mut ctx = context();
        ctx.hints_used = 1;
        let result = service.evaluate("Paris", ctx).await;
        assert_eq!(result.rating, Rating::Hard);
    }

    #[test]
    fn punctuation_only_transcript_is_rejected() {
        assert!(is_punctuation_only("."));
        assert!(is_punctuation_only("..."));
        assert!(is_punctuation_only("?!"));
    }

    #[test]
    fn empty_or_single_character_is_not_punctuation_only() {
        assert!(!is_punctuation_only(""));
        assert!(!is_punctuation_only("   "));
        assert!(!is_punctuation_only("a"));
        assert!(!is_punctuation_only("Paris"));
    }

    #[tokio::test]
    async fn llm_failure_degrades_gracefully() {
        let llm = Arc::new(FailingLlm);
        let service = EvaluationService::new(llm);
        let result = service.evaluate("Paris", context()).await;
        assert_eq!(result.rating, Rating::Hard);
        assert!(!result.is_correct);
    }
}
