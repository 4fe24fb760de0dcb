//! Progressive hint generation with a static fallback (§4.5 Hint Service).

use std::sync::Arc;

use tracing::warn;

use crate::ports::{HintResponse, HintType, LlmPort};

/// A generated hint, with the level it was requested at so the caller
/// (§4.7 C7) knows whether to also publish `reveal_answer`.
#[derive(Debug, Clone)]
pub struct Hint {
    pub text: String,
    pub hint_type: HintType,
    /// `true` once the UI should flip the card to show the back (level ≥2).
    pub reveals_answer: bool,
}

/// Everything a hint request needs about the card and the learner's
/// history with it so far.
#[derive(Debug, Clone, Copy)]
pub struct HintContext<'a> {
    pub question: &'a str,
    pub answer: &'a str,
    pub level: u32,
    pub previous_hints: &'a [String],
    pub user_attempts: &'a [String],
    pub socratic_context: &'a [String],
    pub evaluation_gap: Option<&'a str>,
}

/// Generates progressive hints via the LLM, falling back to a static
/// reveal schedule when the LLM call fails.
pub struct HintService {
    llm: Arc<dyn LlmPort>,
}

impl HintService {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmPort>) -> Self {
        Self { llm }
    }

    /// Generate the hint for `context.level` (0 = contextual, 1 = deeper,
    /// ≥2 = reveal). Never fails: on LLM error, falls back to
    /// [`progressive_hint`].
    pub async fn hint(&self, context: HintContext<'_>) -> Hint {
        let reveals_answer = context.level >= 2;
        match self
            .llm
            .generate_hint(
                context.question,
                context.answer,
                context.level,
                context.previous_hints,
                context.user_attempts,
                context.socratic_context,
                context.evaluation_gap,
            )
            .await
        {
            Ok(HintResponse { hint, hint_type }) => Hint {
                text: hint,
                hint_type,
                reveals_answer,
            },
            Err(err) => {
                warn!(error = %err, level = context.level, "hint generation failed; using static fallback");
                Hint {
                    text: progressive_hint(context.answer, context.level),
                    hint_type: static_hint_type(context.level),
                    reveals_answer,
                }
            }
        }
    }

    /// One call to the LLM's explain port for a ≤40-word "why this
    /// matters", used when the learner gives up. Falls back to a short,
    /// reviewable-answer nudge on failure (§7 transient path).
    pub async fn explain(&self, question: &str, answer: &str) -> String {
        match self.llm.explain_answer(question, answer).await {
            Ok(response) => response.summary,
            Err(err) => {
                warn!(error = %err, "explain_answer failed; using fallback nudge");
                format!("Worth reviewing: {answer}.")
            }
        }
    }
}

fn static_hint_type(level: u32) -> HintType {
    match level {
        0 => HintType::Contextual,
        1 => HintType::Deeper,
        _ => HintType::Reveal,
    }
}

/// Static fallback hint schedule when the LLM is unavailable: the first
/// sentence, then the first half, then the full answer.
#[must_use]
pub fn progressive_hint(answer: &str, level: u32) -> String {
    match level {
        0 => first_sentence(answer),
        1 => first_half(answer),
        _ => answer.to_owned(),
    }
}

fn first_sentence(answer: &str) -> String {
    let trimmed = answer.trim();
    match trimmed.find(['.', '!', '?']) {
        Some(idx) => trimmed[..=idx].to_owned(),
        None => trimmed.to_owned(),
    }
}

fn first_half(answer: &str) -> String {
    let trimmed = answer.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    let half = (chars.len() / 2).max(1);
    let mut out: String = chars[..half].iter().collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TutorError};
    use crate::ports::{EvaluateRequest, ExplanationResponse, RawEvaluation};
    use async_trait::async_trait;

    struct FailingLlm;

    #[async_trait]
    impl LlmPort for FailingLlm {
        async fn evaluate(&self, _request: EvaluateRequest<'_>) -> Result<RawEvaluation> {
            unimplemented!()
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
            Err(TutorError::Llm("unavailable".into()))
        }

        async fn explain_answer(&self, _question: &str, _answer: &str) -> Result<ExplanationResponse> {
            Err(TutorError::Llm("unavailable".into()))
        }
    }

    struct OkLlm;

    #[async_trait]
    impl LlmPort for OkLlm {
        async fn evaluate(&self, _request: EvaluateRequest<'_>) -> Result<RawEvaluation> {
            unimplemented!()
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
            Ok(HintResponse {
                hint: "Think of the Eiffel Tower.".into(),
                hint_type: HintType::Contextual,
            })
        }

        async fn explain_answer(&self, _question: &str, _answer: &str) -> Result<ExplanationResponse> {
            Ok(ExplanationResponse { summary: "It's the capital and largest city.".into() })
        }
    }

    fn ctx(level: u32) -> HintContext<'static> {
        HintContext {
            question: "Capital of France?",
            answer: "Paris is the capital of France. It sits on the Seine.",
            level,
            previous_hints: &[],
            user_attempts: &[],
            socratic_context: &[],
            evaluation_gap: None,
        }
    }

    #[tokio::test]
    async fn level_ge_2_marks_reveals_answer() {
        let service = HintService::new(Arc::new(OkLlm));
        let hint = service.hint(ctx(2)).await;
        assert!(hint.reveals_answer);
        let hint = service.hint(ctx(0)).await;
        assert!(!hint.reveals_answer);
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_progressive_hint() {
        let service = HintService::new(Arc::new(FailingLlm));
        let hint = service.hint(ctx(0)).await;
        assert_eq!(hint.text, "Paris is the capital of France.");
    }

    #[tokio::test]
    async fn explain_falls_back_on_failure() {
        let service = HintService::new(Arc::new(FailingLlm));
        let summary = service.explain("Capital of France?", "Paris").await;
        assert!(summary.contains("Paris"));
    }

    #[test]
    fn progressive_hint_schedule_first_sentence_then_half_then_full() {
        let answer = "Paris is the capital of France. It sits on the Seine.";
        assert_eq!(progressive_hint(answer, 0), "Paris is the capital of France.");
        assert!(progressive_hint(answer, 1).ends_with('…'));
        assert_eq!(progressive_hint(answer, 2), answer);
    }
}
