//! Evaluation result types (§3 EvaluationResult, §4.4 Evaluation Service).

use serde::{Deserialize, Serialize};

use super::card::Rating;

/// The LLM's graded judgement of a single answer attempt, after domain
/// overrides have been applied by the evaluation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub reasoning: String,
    #[serde(default)]
    pub corrected_transcript: Option<String>,
    pub is_correct: bool,
    /// 1..=4.
    pub fluency: u8,
    pub rating: Rating,
    /// At most 150 characters.
    pub feedback: String,
    pub enter_socratic: bool,
    #[serde(default)]
    pub socratic_prompt: Option<String>,
    pub answer_summary: String,
}

impl EvaluationResult {
    const GENERIC_SOCRATIC_PROMPT: &'static str =
        "Can you tell me a bit more about how you got there?";
    const GRACEFUL_FALLBACK_FEEDBACK: &'static str =
        "I had trouble evaluating that one — let's call it Hard and move on.";

    /// A fixed, non-LLM result used when the answer never reached the LLM:
    /// timeout, an explicit skip phrase, or an empty transcript (§4.4).
    #[must_use]
    pub fn short_circuit_no_worries() -> Self {
        Self {
            reasoning: "no answer given".to_owned(),
            corrected_transcript: None,
            is_correct: false,
            fluency: 1,
            rating: Rating::Again,
            feedback: "No worries, let's move on.".to_owned(),
            enter_socratic: false,
            socratic_prompt: None,
            answer_summary: String::new(),
        }
    }

    /// Used when the LLM evaluate call itself fails (§4.4, §7 transient path).
    #[must_use]
    pub fn graceful_degradation() -> Self {
        Self {
            reasoning: "evaluation service unavailable".to_owned(),
            corrected_transcript: None,
            is_correct: false,
            fluency: 2,
            rating: Rating::Hard,
            feedback: Self::GRACEFUL_FALLBACK_FEEDBACK.to_owned(),
            enter_socratic: false,
            socratic_prompt: None,
            answer_summary: String::new(),
        }
    }

    /// Apply the domain override rules from §4.4 to a raw LLM response.
    /// `hints_used` is the number of hints the learner has taken on this card.
    pub fn apply_overrides(&mut self, hints_used: u32) {
        // (a) hints cap the rating at Hard.
        if hints_used > 0 {
            self.rating = self.rating.clamp_max(Rating::Hard);
        }

        // (b) correct answers never enter Socratic; fluent correct answers
        // are bumped to at least Good — but never above the hint cap from (a).
        if self.is_correct {
            self.enter_socratic = false;
            self.socratic_prompt = None;
            if hints_used == 0 && self.fluency >= 3 && self.rating < Rating::Good {
                self.rating = Rating::Good;
            }
        }

        // (c) a Socratic entry without a prompt gets a generic fallback.
        if self.enter_socratic && self.socratic_prompt.is_none() {
            self.socratic_prompt = Some(Self::GENERIC_SOCRATIC_PROMPT.to_owned());
        }
    }
}
