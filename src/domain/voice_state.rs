//! Per-session voice state and its pure transition functions (§3 VoiceState,
//! §4.6 Voice State Manager).
//!
//! Everything here is a plain record plus free functions / inherent methods
//! that transform it — no I/O, no async, no LLM calls. `SessionOrchestrator`
//! (§4.7) is the only caller.

use std::collections::VecDeque;

use super::card::{Card, Rating};
use super::evaluation::EvaluationResult;

/// Maximum Socratic follow-up turns before falling through to feedback.
pub const MAX_SOCRATIC_TURNS: u32 = 2;

/// Maximum distinct user attempts retained per card.
const MAX_USER_ATTEMPTS: usize = 3;

/// Maximum Socratic exchange entries retained (3 exchanges × 2 lines).
const MAX_SOCRATIC_CONTEXT: usize = 6;

/// One exchange line in the Socratic follow-up transcript.
#[derive(Debug, Clone)]
pub enum SocraticLine {
    Ai(String),
    User(String),
}

/// A recorded rating for one card, in the order it was given.
#[derive(Debug, Clone)]
pub struct RatingEntry {
    pub card_id: u64,
    pub rating: Rating,
}

/// Per-session mutable tutoring state (§3 VoiceState).
#[derive(Debug, Default)]
pub struct VoiceState {
    pub current_card: Option<Card>,
    previous_card: Option<Card>,
    pub card_queue: VecDeque<Card>,

    pub hints_used: u32,
    pub previous_hints: Vec<String>,
    pub user_attempts: VecDeque<String>,

    pub socratic_context: VecDeque<SocraticLine>,
    pub socratic_turn_count: u32,

    pub last_evaluation: Option<EvaluationResult>,
    previous_evaluation: Option<EvaluationResult>,

    pub rating_history: Vec<RatingEntry>,
    pub consecutive_timeouts: u32,

    can_undo: bool,
}

impl VoiceState {
    /// Build initial state from a freshly fetched card queue.
    #[must_use]
    pub fn new(mut cards: VecDeque<Card>) -> Self {
        let current_card = cards.pop_front();
        Self {
            current_card,
            card_queue: cards,
            ..Default::default()
        }
    }

    /// Number of cards already rated this session.
    #[must_use]
    pub fn cards_reviewed(&self) -> usize {
        self.rating_history.len()
    }

    /// Number of cards left to review, including the current one.
    #[must_use]
    pub fn cards_remaining(&self) -> usize {
        self.card_queue.len() + usize::from(self.current_card.is_some())
    }

    /// Whether the session should end because the queue (and current card)
    /// are both exhausted.
    #[must_use]
    pub fn should_end(&self) -> bool {
        self.current_card.is_none() && self.card_queue.is_empty()
    }

    /// Advance to the next card, resetting all per-card fields.
    pub fn advance_to_next_card(&mut self) {
        self.previous_card = self.current_card.take();
        self.current_card = self.card_queue.pop_front();
        self.hints_used = 0;
        self.previous_hints.clear();
        self.user_attempts.clear();
        self.socratic_context.clear();
        self.socratic_turn_count = 0;
        self.previous_evaluation = self.last_evaluation.take();
        self.can_undo = true;
    }

    /// Record a rating for the given card into the authoritative history.
    pub fn record_rating(&mut self, card_id: u64, rating: Rating) {
        self.rating_history.push(RatingEntry { card_id, rating });
    }

    /// Enter Socratic follow-up mode: record the AI's prompt and bump the
    /// turn counter. Per the resolved open question (§4.6 / §9), the counter
    /// increments here — when the prompt is emitted — never on the user's
    /// reply.
    ///
    /// # Panics
    ///
    /// Panics if called when `socratic_turn_count` has already reached
    /// [`MAX_SOCRATIC_TURNS`] — the caller (the orchestrator) must never
    /// request a new Socratic prompt past the cap.
    pub fn enter_socratic(&mut self, prompt: String) {
        assert!(
            self.socratic_turn_count < MAX_SOCRATIC_TURNS,
            "enter_socratic called past MAX_SOCRATIC_TURNS"
        );
        self.socratic_turn_count += 1;
        self.push_socratic_line(SocraticLine::Ai(prompt));
    }

    /// Record the learner's reply within an already-open Socratic exchange.
    pub fn add_socratic_reply(&mut self, text: String) {
        self.push_socratic_line(SocraticLine::User(text));
    }

    fn push_socratic_line(&mut self, line: SocraticLine) {
        self.socratic_context.push_back(line);
        while self.socratic_context.len() > MAX_SOCRATIC_CONTEXT {
            self.socratic_context.pop_front();
        }
    }

    /// `true` while the learner may still continue in Socratic mode.
    #[must_use]
    pub fn can_enter_socratic(&self) -> bool {
        self.socratic_turn_count < MAX_SOCRATIC_TURNS
    }

    /// Record a user attempt transcript for the current card (last 3, unique).
    pub fn add_user_attempt(&mut self, text: String) {
        if self.user_attempts.iter().any(|t| t == &text) {
            return;
        }
        self.user_attempts.push_back(text);
        while self.user_attempts.len() > MAX_USER_ATTEMPTS {
            self.user_attempts.pop_front();
        }
    }

    /// Increment the hint counter and record the hint text so subsequent
    /// hint requests can ask the LLM for a different angle.
    pub fn record_hint(&mut self, hint_text: String) {
        self.hints_used += 1;
        self.previous_hints.push(hint_text);
    }

    /// `true` if an undo is currently available (one level only).
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.can_undo && self.previous_card.is_some()
    }

    /// Undo the last rating: requeue the current card, restore the previous
    /// one, pop the last rating, and clear the undo slot (one level only).
    pub fn undo_last_rating(&mut self) {
        if !self.can_undo() {
            return;
        }
        if let Some(current) = self.current_card.take() {
            self.card_queue.push_front(current);
        }
        self.current_card = self.previous_card.take();
        self.last_evaluation = self.previous_evaluation.take();
        self.rating_history.pop();
        self.can_undo = false;
    }

    /// Distribution of ratings given so far, in the order §4.6 exposes stats.
    #[must_use]
    pub fn rating_distribution(&self) -> RatingDistribution {
        let mut dist = RatingDistribution::default();
        for entry in &self.rating_history {
            match entry.rating {
                Rating::Again => dist.again += 1,
                Rating::Hard => dist.hard += 1,
                Rating::Good => dist.good += 1,
                Rating::Easy => dist.easy += 1,
            }
        }
        dist
    }
}

/// Count of ratings given per grade, for session-end stats.
#[derive(Debug, Clone, Copy, Default)]
pub struct RatingDistribution {
    pub again: u32,
    pub hard: u32,
    pub good: u32,
    pub easy: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::card::QueueClass;

    fn card(id: u64) -> Card {
        Card {
            id,
            deck_name: "Capitals".into(),
            question: "Capital of France?".into(),
            answer: "Paris".into(),
            image_url: None,
            queue_class: QueueClass::Review,
        }
    }

    fn queue(ids: &[u64]) -> VecDeque<Card> {
        ids.iter().map(|id| card(*id)).collect()
    }

    #[test]
    fn new_pops_first_card_as_current() {
        let state = VoiceState::new(queue(&[1, 2, 3]));
        assert_eq!(state.current_card.as_ref().unwrap().id, 1);
        assert_eq!(state.cards_remaining(), 3);
    }

    #[test]
    fn advance_resets_per_card_fields() {
        let mut state = VoiceState::new(queue(&[1, 2]));
        state.record_hint("hint".into());
        state.add_user_attempt("wrong".into());
        state.advance_to_next_card();
        assert_eq!(state.hints_used, 0);
        assert!(state.user_attempts.is_empty());
        assert_eq!(state.current_card.as_ref().unwrap().id, 2);
    }

    #[test]
    fn should_end_when_queue_and_current_exhausted() {
        let mut state = VoiceState::new(queue(&[1]));
        assert!(!state.should_end());
        state.advance_to_next_card();
        assert!(state.should_end());
    }

    #[test]
    fn socratic_turn_increments_on_prompt_not_reply() {
        let mut state = VoiceState::new(queue(&[1]));
        state.enter_socratic("Which city?".into());
        assert_eq!(state.socratic_turn_count, 1);
        state.add_socratic_reply("Paris I think".into());
        assert_eq!(state.socratic_turn_count, 1);
    }

    #[test]
    fn socratic_cap_enforced_by_can_enter_socratic() {
        let mut state = VoiceState::new(queue(&[1]));
        state.enter_socratic("a".into());
        state.enter_socratic("b".into());
        assert!(!state.can_enter_socratic());
    }

    #[test]
    #[should_panic(expected = "MAX_SOCRATIC_TURNS")]
    fn enter_socratic_past_cap_panics() {
        let mut state = VoiceState::new(queue(&[1]));
        state.enter_socratic("a".into());
        state.enter_socratic("b".into());
        state.enter_socratic("c".into());
    }

    #[test]
    fn undo_restores_previous_card_and_rating() {
        let mut state = VoiceState::new(queue(&[1, 2]));
        state.record_rating(1, Rating::Good);
        state.advance_to_next_card();
        assert_eq!(state.current_card.as_ref().unwrap().id, 2);

        assert!(state.can_undo());
        state.undo_last_rating();
        assert_eq!(state.current_card.as_ref().unwrap().id, 1);
        assert!(!state.can_undo());
        assert_eq!(state.rating_history.len(), 0);
    }

    #[test]
    fn undo_is_one_level_only() {
        let mut state = VoiceState::new(queue(&[1, 2, 3]));
        state.record_rating(1, Rating::Good);
        state.advance_to_next_card();
        state.record_rating(2, Rating::Good);
        state.advance_to_next_card();

        state.undo_last_rating();
        assert!(!state.can_undo());
        // A second undo call is a no-op.
        let before = state.current_card.clone();
        state.undo_last_rating();
        assert_eq!(state.current_card, before);
    }

    #[test]
    fn user_attempts_are_deduplicated_and_capped() {
        let mut state = VoiceState::new(queue(&[1]));
        state.add_user_attempt("a".into());
        state.add_user_attempt("a".into());
        state.add_user_attempt("b".into());
        state.add_user_attempt("c".into());
        state.add_user_attempt("d".into());
        assert_eq!(state.user_attempts.len(), 3);
        assert_eq!(state.user_attempts.front().unwrap(), "b");
    }

    #[test]
    fn rating_distribution_counts_each_grade() {
        let mut state = VoiceState::new(queue(&[1, 2, 3]));
        state.record_rating(1, Rating::Easy);
        state.record_rating(2, Rating::Again);
        state.record_rating(3, Rating::Easy);
        let dist = state.rating_distribution();
        assert_eq!(dist.easy, 2);
        assert_eq!(dist.again, 1);
        assert_eq!(dist.good, 0);
    }
}
