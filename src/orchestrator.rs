//! Session Orchestrator: the single-threaded cooperative event loop that
//! drives one learner's review session (§4.7 C7).
//!
//! Mirrors the teacher's pipeline coordinator: one `tokio::select!` loop
//! consuming a tagged event enum, side effects (LLM calls, TTS synthesis)
//! run as tracked child tasks that report back as further events, and a
//! [`CancellationToken`] tears everything down on stop/barge-in. The loop
//! itself never awaits an external call directly — it only ever awaits the
//! next event.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command_parser::{self, CommandKind, ParseContext, ParsedCommand};
use crate::domain::card::Rating;
use crate::domain::session::Session;
use crate::domain::voice_state::VoiceState;
use crate::domain::Transcript;
use crate::error::Result;
use crate::events::{CardPayload, Event, Progress, SessionStats, TimerKind, TranscriptSource, UiEvent};
use crate::evaluation_service::{EvaluationContext, EvaluationService};
use crate::hint_service::{HintContext, HintService};
use crate::ports::{FlashcardStore, TtsPort};
use crate::publisher::UiPublisher;
use crate::recovery_store::RecoveryStore;
use crate::turn_detector::{self, TurnDetectorInput, TurnStatus};
use crate::usage::UsageLedger;

/// Inbound audio silence is sampled on this cadence by the realtime
/// transport layer, which feeds `Event::Timer(TimerKind::SilenceTick)`.
pub const SILENCE_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// How the session's event loop ended, so the owner ([`crate::session_manager`])
/// knows what to do next.
#[derive(Debug)]
pub enum SessionOutcome {
    /// All cards reviewed; ready for `SyncingEnd`.
    Completed,
    /// The learner said/pressed stop.
    Stopped,
    /// Inactivity timeout elapsed.
    Expired,
    /// Three consecutive silence timeouts; the learner is unreachable but
    /// nothing crashed (§4.7.9, §4.9 DEGRADED).
    Degraded,
    /// The event channel closed unexpectedly (transport died).
    ChannelClosed,
}

/// Three consecutive `Timer(SilenceTick)` timeouts end the session as
/// degraded rather than looping forever (§4.7.9, tested in §8).
const MAX_CONSECUTIVE_TIMEOUTS: u32 = 3;

/// Below this, inbound audio during TTS is noise, not barge-in (§4.10).
const BARGE_IN_NOISE_FLOOR: Duration = Duration::from_millis(100);
/// Below this with no transcript yet, acknowledge with "Yes?" and keep
/// listening rather than switching away from the utterance (§4.10).
const BARGE_IN_ACK_WINDOW: Duration = Duration::from_millis(500);
/// Minimum confidence for a partial transcript to be executed as a
/// command mid-utterance instead of falling through to LISTENING (§4.10).
const BARGE_IN_COMMAND_CONFIDENCE: f32 = 0.7;

/// Everything the orchestrator needs to drive one session, independent of
/// transport (HTTP, websocket, or test harness all construct this the same
/// way).
pub struct SessionOrchestrator {
    pub session: Session,
    state: VoiceState,
    evaluation: Arc<EvaluationService>,
    hints: Arc<HintService>,
    store: Arc<dyn FlashcardStore>,
    recovery: Arc<RecoveryStore>,
    /// Append-only billing ledger (§6.5, §10.1). `None` in tests and in any
    /// deployment that hasn't configured a usage log path; usage tracking
    /// is observability-only, never load-bearing.
    usage: Option<Arc<UsageLedger>>,
    publisher: UiPublisher,
    events_rx: mpsc::Receiver<Event>,
    events_tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
    /// Background evaluate/hint/explain calls in flight, tracked so a Stop
    /// or session teardown can drain or abort them instead of leaking tasks.
    tasks: JoinSet<()>,
    parse_context: ParseContext,
    /// `true` while we are inside a Socratic follow-up exchange rather than
    /// waiting for a first attempt at the current card.
    in_socratic: bool,
    pending_transcript: Option<Transcript>,
    clarifications_used: u32,
    silence_started_at: Option<Instant>,
    response_started_at: Option<Instant>,
    /// `true` while a TTS utterance is in flight, for barge-in handling.
    speaking: bool,
    /// Cancels the in-flight TTS child task; replaced with a fresh token
    /// every time [`SessionOrchestrator::speak`] starts a new utterance, so
    /// cancelling it never reaches back and stops a *later* utterance.
    speech_cancel: CancellationToken,
    /// When the current barge-in episode's first audio chunk arrived, so
    /// elapsed duration can be compared against the §4.10 thresholds.
    barge_in_started_at: Option<Instant>,
    /// Text-to-speech port (§4.8, §4.10, §5's TTS timeout). Out of scope
    /// per §1 as a concrete backend, but the orchestrator still owns
    /// calling it, timing it out, and cancelling it on barge-in.
    tts: Arc<dyn TtsPort>,
    /// Resolved per-environment inactivity window (§4.9: 30 min prod / 5
    /// min dev), threaded in by [`crate::session_manager`] so expiry here
    /// matches the same policy the inactivity ticker was scheduled against.
    inactivity_timeout: Duration,
}

impl SessionOrchestrator {
    /// Build a new orchestrator with a freshly fetched card queue and an
    /// already-open event channel. `events_tx` is cloned into background
    /// tasks so their results re-enter the loop as ordinary events.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Session,
        cards: std::collections::VecDeque<crate::domain::card::Card>,
        evaluation: Arc<EvaluationService>,
        hints: Arc<HintService>,
        store: Arc<dyn FlashcardStore>,
        recovery: Arc<RecoveryStore>,
        usage: Option<Arc<UsageLedger>>,
        tts: Arc<dyn TtsPort>,
        ui_tx: mpsc::Sender<UiEvent>,
        events_rx: mpsc::Receiver<Event>,
        events_tx: mpsc::Sender<Event>,
        cancel: CancellationToken,
        inactivity_timeout: Duration,
    ) -> Self {
        Self {
            session,
            state: VoiceState::new(cards),
            evaluation,
            hints,
            store,
            recovery,
            usage,
            publisher: UiPublisher::new(ui_tx),
            events_rx,
            events_tx,
            cancel,
            tasks: JoinSet::new(),
            parse_context: ParseContext::Listening,
            in_socratic: false,
            pending_transcript: None,
            clarifications_used: 0,
            silence_started_at: None,
            response_started_at: Some(Instant::now()),
            speaking: false,
            speech_cancel: CancellationToken::new(),
            barge_in_started_at: None,
            tts,
            inactivity_timeout,
        }
    }

    /// Run the event loop until the session completes, is stopped, expires,
    /// or its channel closes (§4.7, §4.9).
    pub async fn run(mut self) -> SessionOutcome {
        info!(session_id = %self.session.id, deck = %self.session.deck_name, "session started");
        self.publish_current_card(None).await;

        let outcome = loop {
            if self.state.should_end() {
                break SessionOutcome::Completed;
            }

            let terminal = tokio::select! {
                () = self.cancel.cancelled() => Some(SessionOutcome::Stopped),
                Some(finished) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(err) = finished {
                        if err.is_panic() {
                            warn!(%err, "background task panicked");
                        }
                    }
                    None
                }
                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => Some(SessionOutcome::ChannelClosed),
                    }
                }
            };

            if let Some(outcome) = terminal {
                break outcome;
            }
        };

        // Every exit path flushes recorded ratings and reports stats (§4.11:
        // "force-ends every live session, best effort flush of ratings"),
        // not just the happy-path "all cards reviewed" case.
        self.finish_session().await;
        outcome
    }

    /// Dispatch one inbound event. Returns `Some(outcome)` when the loop
    /// should end.
    async fn handle_event(&mut self, event: Event) -> Option<SessionOutcome> {
        match event {
            Event::AudioChunk(_chunk) => {
                // Transcription happens upstream in the realtime transport;
                // arriving audio only resets the silence clock here, or
                // triggers the §4.10 barge-in algorithm if we are mid-utterance.
                self.note_activity();
                if self.speaking {
                    return self.handle_barge_in_audio().await;
                }
                None
            }
            Event::FinalTranscript { text, confidence } => {
                self.note_activity();
                self.publisher
                    .publish(UiEvent::UserTranscript { text: text.clone(), source: TranscriptSource::Voice })
                    .await;
                self.pending_transcript = Some(Transcript {
                    text: text.clone(),
                    confidence,
                    is_final: true,
                    segments: vec![],
                });
                self.route_utterance(text, confidence).await
            }
            Event::UserText(text) => {
                self.note_activity();
                self.publisher
                    .publish(UiEvent::UserTranscript { text: text.clone(), source: TranscriptSource::Text })
                    .await;
                self.route_utterance(text, 1.0).await
            }
            Event::Button(cmd) => {
                self.note_activity();
                self.dispatch(button_to_command(cmd)).await
            }
            Event::Ptt(ptt) => {
                self.note_activity();
                if matches!(ptt, crate::events::PttEvent::Start) && self.speaking {
                    self.cancel_speech().await;
                }
                self.publisher
                    .publish(UiEvent::PttState { recording: matches!(ptt, crate::events::PttEvent::Start) })
                    .await;
                None
            }
            Event::TtsDone => {
                self.speaking = false;
                self.publisher.publish_speaking_state(false).await;
                None
            }
            Event::EvaluationReady(result) => {
                self.on_evaluation_ready(*result).await;
                None
            }
            Event::Timer(TimerKind::SilenceTick) => {
                self.on_silence_tick().await
            }
            Event::Timer(TimerKind::InactivityTick) => {
                if self.session.is_expired(self.inactivity_timeout) {
                    Some(SessionOutcome::Expired)
                } else {
                    None
                }
            }
            Event::ManualRating(rating) => {
                self.note_activity();
                self.handle_manual_rating(rating).await;
                None
            }
        }
    }

    fn note_activity(&mut self) {
        self.session.touch();
        self.silence_started_at = None;
        self.state.consecutive_timeouts = 0;
    }

    async fn on_silence_tick(&mut self) -> Option<SessionOutcome> {
        let silence = self
            .silence_started_at
            .get_or_insert_with(Instant::now)
            .elapsed();
        let status = turn_detector::detect_turn(TurnDetectorInput {
            transcript: self.pending_transcript.as_ref(),
            silence,
            clarifications_used: self.clarifications_used,
            in_socratic_mode: self.in_socratic,
        });
        match status {
            TurnStatus::Listening | TurnStatus::Thinking => None,
            TurnStatus::Timeout => {
                self.clarifications_used = 0;
                self.pending_transcript = None;
                self.silence_started_at = None;
                self.state.consecutive_timeouts += 1;
                if self.state.consecutive_timeouts >= MAX_CONSECUTIVE_TIMEOUTS {
                    warn!(
                        session_id = %self.session.id,
                        "three consecutive silence timeouts; ending session as degraded"
                    );
                    return Some(SessionOutcome::Degraded);
                }
                let text = String::new();
                self.start_evaluation(text).await;
                None
            }
            TurnStatus::NeedsClarification => {
                self.clarifications_used += 1;
                self.silence_started_at = None;
                self.say("Sorry, I didn't catch that — could you say it again?".into()).await;
                None
            }
            TurnStatus::UtteranceComplete => {
                self.silence_started_at = None;
                if let Some(transcript) = self.pending_transcript.take() {
                    if self.parse_context == ParseContext::Listening {
                        if crate::evaluation_service::is_punctuation_only(&transcript.text) {
                            self.say("I didn't catch that…".into()).await;
                        } else {
                            self.start_evaluation(transcript.text).await;
                        }
                    }
                }
                None
            }
        }
    }

    async fn route_utterance(&mut self, text: String, confidence: f32) -> Option<SessionOutcome> {
        let parsed = command_parser::parse_command(&text, self.parse_context, confidence);
        self.dispatch(parsed).await
    }

    #[allow(clippy::too_many_lines)]
    async fn dispatch(&mut self, parsed: ParsedCommand) -> Option<SessionOutcome> {
        match parsed.kind {
            CommandKind::Answer => {
                if crate::evaluation_service::is_punctuation_only(&parsed.raw) {
                    self.say("I didn't catch that…".into()).await;
                    return None;
                }
                if self.in_socratic {
                    self.state.add_socratic_reply(parsed.raw.clone());
                }
                self.state.add_user_attempt(parsed.raw.clone());
                self.start_evaluation(parsed.raw).await;
                None
            }
            CommandKind::Skip => {
                self.requeue_current_card();
                self.advance_card().await;
                None
            }
            CommandKind::GiveUp => {
                self.handle_give_up().await;
                None
            }
            CommandKind::Repeat | CommandKind::ReadAgain => {
                self.replay_current_prompt().await;
                None
            }
            CommandKind::Hint => {
                self.handle_hint_request().await;
                None
            }
            CommandKind::Stop => Some(SessionOutcome::Stopped),
            CommandKind::Undo => {
                self.handle_undo().await;
                None
            }
            CommandKind::Explain | CommandKind::Why => {
                self.handle_explain().await;
                None
            }
            CommandKind::Status => {
                self.handle_status().await;
                None
            }
            CommandKind::Next => {
                self.advance_card().await;
                None
            }
            CommandKind::MarkAgain => {
                self.handle_manual_rating(Rating::Again).await;
                None
            }
            CommandKind::MarkHard => {
                self.handle_manual_rating(Rating::Hard).await;
                None
            }
            CommandKind::MarkGood => {
                self.handle_manual_rating(Rating::Good).await;
                None
            }
            CommandKind::MarkEasy => {
                self.handle_manual_rating(Rating::Easy).await;
                None
            }
            CommandKind::Slower | CommandKind::Faster => {
                // Playback rate is a transport concern; acknowledged here so
                // the learner gets a response, actual rate lives on the TTS
                // adapter call the transport layer makes.
                self.replay_current_prompt().await;
                None
            }
            CommandKind::Disagree | CommandKind::Reanswer => {
                self.handle_reanswer().await;
                None
            }
        }
    }

    async fn start_evaluation(&mut self, transcript_text: String) {
        let Some(card) = self.state.current_card.clone() else { return };
        self.response_started_at.get_or_insert_with(Instant::now);
        let response_time_s = self
            .response_started_at
            .take()
            .map_or(0.0, |start| start.elapsed().as_secs_f32());

        let socratic_context: Vec<String> = self
            .state
            .socratic_context
            .iter()
            .map(|line| match line {
                crate::domain::voice_state::SocraticLine::Ai(text) => format!("tutor: {text}"),
                crate::domain::voice_state::SocraticLine::User(text) => format!("learner: {text}"),
            })
            .collect();

        let evaluation = Arc::clone(&self.evaluation);
        let hints_used = self.state.hints_used;
        let tx = self.events_tx.clone();
        let question = card.question.clone();
        let answer = card.answer.clone();
        let usage = self.usage.clone();
        let session_id = self.session.id.clone();

        self.tasks.spawn(async move {
            let context = EvaluationContext {
                question: &question,
                expected_answer: &answer,
                response_time_s,
                hints_used,
                socratic_context: &socratic_context,
            };
            let result = evaluation.evaluate(&transcript_text, context).await;
            if let Some(usage) = &usage {
                let prompt = estimate_tokens(&[&question, &answer, &transcript_text]);
                let completion = estimate_tokens(&[&result.reasoning, &result.feedback]);
                usage.record_llm(&session_id, "evaluate", prompt, completion);
            }
            let _ = tx.send(Event::EvaluationReady(Box::new(result))).await;
        });
    }

    async fn on_evaluation_ready(&mut self, result: crate::domain::evaluation::EvaluationResult) {
        let Some(card) = self.state.current_card.clone() else { return };

        if result.enter_socratic && self.state.can_enter_socratic() {
            self.in_socratic = true;
            self.parse_context = ParseContext::Listening;
            let prompt = result
                .socratic_prompt
                .clone()
                .unwrap_or_else(|| "Can you say a bit more?".into());
            self.state.last_evaluation = Some(result);
            self.state.enter_socratic(prompt.clone());
            self.say(prompt).await;
            return;
        }

        self.in_socratic = false;
        self.parse_context = ParseContext::Feedback;
        self.record_final_rating(card.id, result.rating);
        self.state.last_evaluation = Some(result.clone());

        self.publisher
            .publish(UiEvent::RatingResult {
                rating: result.rating.as_u8(),
                feedback: result.feedback.clone(),
                card_back: card.answer.clone(),
                answer_summary: result.answer_summary.clone(),
                progress: self.progress(),
            })
            .await;

        if !result.feedback.trim().is_empty() {
            self.say(result.feedback).await;
        }
    }

    async fn handle_give_up(&mut self) {
        let Some(card) = self.state.current_card.clone() else { return };
        let explanation = self.hints.explain(&card.question, &card.answer).await;
        self.record_llm_usage("explain", &[&card.question, &card.answer], &[&explanation]);
        self.in_socratic = false;
        self.parse_context = ParseContext::Feedback;
        self.record_final_rating(card.id, Rating::Again);
        self.publisher
            .publish(UiEvent::RatingResult {
                rating: Rating::Again.as_u8(),
                feedback: explanation.clone(),
                card_back: card.answer,
                answer_summary: String::new(),
                progress: self.progress(),
            })
            .await;
        self.say(explanation).await;
    }

    async fn handle_hint_request(&mut self) {
        let Some(card) = self.state.current_card.clone() else { return };
        let user_attempts: Vec<String> = self.state.user_attempts.iter().cloned().collect();
        let context = HintContext {
            question: &card.question,
            answer: &card.answer,
            level: self.state.hints_used,
            previous_hints: &self.state.previous_hints,
            user_attempts: &user_attempts,
            socratic_context: &[],
            evaluation_gap: None,
        };
        let hint = self.hints.hint(context).await;
        self.record_llm_usage("hint", &[&card.question, &card.answer], &[&hint.text]);
        self.state.record_hint(hint.text.clone());

        // The card flip happens before the hint text is surfaced (§8
        // scenario 4): reveal first, then speak/publish the hint.
        if hint.reveals_answer {
            self.publisher
                .publish(UiEvent::RevealAnswer { card_back: card.answer, progress: self.progress() })
                .await;
        }
        self.say(hint.text).await;
    }

    async fn handle_explain(&mut self) {
        let Some(card) = self.state.current_card.clone() else { return };
        let summary = self.hints.explain(&card.question, &card.answer).await;
        self.record_llm_usage("explain", &[&card.question, &card.answer], &[&summary]);
        self.say(summary).await;
    }

    /// Appends one line to the usage ledger for an LLM call that already
    /// completed on this (non-spawned) path. A no-op when no ledger is
    /// configured (§10.5: observability only, never load-bearing).
    fn record_llm_usage(&self, kind: &str, prompt_parts: &[&str], completion_parts: &[&str]) {
        if let Some(usage) = &self.usage {
            usage.record_llm(
                &self.session.id,
                kind,
                estimate_tokens(prompt_parts),
                estimate_tokens(completion_parts),
            );
        }
    }

    async fn handle_status(&mut self) {
        let dist = self.state.rating_distribution();
        let text = format!(
            "You've reviewed {} of {} cards. Again: {}, Hard: {}, Good: {}, Easy: {}.",
            self.state.cards_reviewed(),
            self.state.cards_reviewed() + self.state.cards_remaining(),
            dist.again,
            dist.hard,
            dist.good,
            dist.easy,
        );
        self.say(text).await;
    }

    async fn handle_undo(&mut self) {
        if !self.state.can_undo() {
            self.say("Nothing to undo.".into()).await;
            return;
        }
        self.state.undo_last_rating();
        self.parse_context = ParseContext::Listening;
        self.in_socratic = false;
        self.publish_current_card(None).await;
    }

    async fn handle_manual_rating(&mut self, rating: Rating) {
        let Some(card) = self.state.current_card.clone() else { return };
        self.record_final_rating(card.id, rating);
        self.publisher
            .publish(UiEvent::RatingResult {
                rating: rating.as_u8(),
                feedback: String::new(),
                card_back: card.answer,
                answer_summary: String::new(),
                progress: self.progress(),
            })
            .await;
    }

    async fn handle_reanswer(&mut self) {
        self.parse_context = ParseContext::Listening;
        self.in_socratic = false;
        self.response_started_at = Some(Instant::now());
    }

    async fn replay_current_prompt(&mut self) {
        if let Some(card) = self.state.current_card.clone() {
            self.say(card.question).await;
        }
    }

    fn record_final_rating(&mut self, card_id: u64, rating: Rating) {
        self.state.record_rating(card_id, rating);
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        if let Err(err) = self.recovery.record_pending_review(card_id, &self.session.id, rating, now) {
            warn!(error = %err, card_id, "failed to append pending review to recovery store");
        }

        let store = Arc::clone(&self.store);
        let session_id = self.session.id.clone();
        self.tasks.spawn(async move {
            if let Err(err) = store.submit_review(card_id, &session_id, rating).await {
                debug!(error = %err, card_id, "fire-and-forget submit_review failed; recovery store has the durable copy");
            }
        });
    }

    fn requeue_current_card(&mut self) {
        if let Some(card) = self.state.current_card.clone() {
            self.state.card_queue.push_back(card);
        }
    }

    async fn advance_card(&mut self) {
        self.state.advance_to_next_card();
        self.parse_context = ParseContext::Listening;
        self.in_socratic = false;
        self.clarifications_used = 0;
        self.response_started_at = Some(Instant::now());
        if self.state.current_card.is_some() {
            self.publish_current_card(None).await;
        }
    }

    async fn publish_current_card(&mut self, last_rating: Option<u8>) {
        let Some(card) = self.state.current_card.clone() else { return };
        self.publisher
            .publish(UiEvent::Card {
                card: CardPayload::from(&card),
                progress: self.progress(),
                last_rating,
            })
            .await;
        // PRESENTING: speak the question; "speak done" is what moves the
        // voice state machine on to LISTENING (§4.9).
        self.speak(card.question).await;
    }

    /// Publish an assistant message and, unless the de-dup cache
    /// suppressed it, speak it — the text is always published before TTS
    /// begins (§4.8).
    async fn say(&mut self, text: String) {
        let published = self
            .publisher
            .publish_agent_message(text.clone(), self.next_message_id())
            .await;
        if published {
            self.speak(text).await;
        }
    }

    /// Synthesize `text` as a cancellable, timed child task (§4.8, §4.10,
    /// §5). Mirrors the teacher's own `speak()` in `pipeline/coordinator.rs`:
    /// a fresh [`CancellationToken`] per utterance raced against the
    /// synthesize call, so a later barge-in or new utterance can cancel it
    /// without reaching back into an already-finished one.
    async fn speak(&mut self, text: String) {
        if text.trim().is_empty() {
            return;
        }

        // Only one utterance is ever in flight; starting a new one
        // supersedes whatever the previous one was still doing rather than
        // leaving it to run to its own timeout.
        self.speech_cancel.cancel();
        self.speech_cancel = CancellationToken::new();
        self.barge_in_started_at = None;
        let cancel = self.speech_cancel.clone();
        let tts = Arc::clone(&self.tts);
        let tx = self.events_tx.clone();
        let timeout = tts_timeout_for(&text);

        self.speaking = true;
        self.publisher.publish_speaking_state(true).await;

        self.tasks.spawn(async move {
            let raced = tokio::select! {
                () = cancel.cancelled() => None,
                res = tokio::time::timeout(timeout, tts.synthesize(&text)) => Some(res),
            };
            match raced {
                None => {
                    // Cancelled, either by a barge-in or by a later
                    // utterance superseding this one; whichever caller
                    // cancelled it owns the `speaking`/state-change update.
                }
                Some(Ok(Ok(_audio))) => {
                    let _ = tx.send(Event::TtsDone).await;
                }
                Some(Ok(Err(err))) => {
                    debug!(error = %err, "tts synthesize failed");
                    let _ = tx.send(Event::TtsDone).await;
                }
                Some(Err(_elapsed)) => {
                    warn!(?timeout, "tts synthesize exceeded its await budget");
                    let _ = tx.send(Event::TtsDone).await;
                }
            }
        });
    }

    /// Barge-in: inbound audio while a TTS utterance is in flight (§4.10).
    /// `Event::AudioChunk` carries no duration, so elapsed wall-clock time
    /// since the first chunk of this barge-in episode stands in for speech
    /// duration; the most recent `FinalTranscript` (`pending_transcript`)
    /// stands in for "the partial transcript so far", since this crate's
    /// event stream has no separate partial-transcript variant.
    async fn handle_barge_in_audio(&mut self) -> Option<SessionOutcome> {
        let started = *self.barge_in_started_at.get_or_insert_with(Instant::now);
        let duration = started.elapsed();
        if duration < BARGE_IN_NOISE_FLOOR {
            return None;
        }

        self.cancel_speech().await;

        if let Some(transcript) = self.pending_transcript.clone() {
            let parsed =
                command_parser::parse_command(&transcript.text, self.parse_context, transcript.confidence);
            if parsed.kind != CommandKind::Answer && parsed.confidence >= BARGE_IN_COMMAND_CONFIDENCE {
                self.barge_in_started_at = None;
                self.pending_transcript = None;
                self.say(barge_in_ack_text(parsed.kind).to_owned()).await;
                return self.dispatch(parsed).await;
            }
        }

        if duration < BARGE_IN_ACK_WINDOW && self.pending_transcript.is_none() {
            self.say("Yes?".to_owned()).await;
            return None;
        }

        self.barge_in_started_at = None;
        self.parse_context = ParseContext::Listening;
        None
    }

    async fn cancel_speech(&mut self) {
        self.speech_cancel.cancel();
        self.speaking = false;
        self.publisher.publish_speaking_state(false).await;
    }

    async fn finish_session(&mut self) {
        if self.speaking {
            self.cancel_speech().await;
        }
        while self.tasks.join_next().await.is_some() {}

        // Give every rating recorded this session one synchronous shot at
        // the flashcard store before reporting final stats (§4.11: the
        // fire-and-forget attempt in `record_final_rating` is best-effort
        // responsiveness, not the source of truth for `/session/end`).
        let sync = crate::sync_orchestrator::SyncOrchestrator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.recovery),
            7,
        )
        .with_max_attempts(1);
        let report = sync.replay_pending().await.unwrap_or_else(|err| {
            warn!(error = %err, "end-of-session sync pass failed; ratings remain in the recovery store");
            crate::sync_orchestrator::SyncReport::default()
        });

        let dist = self.state.rating_distribution();
        let duration_minutes = self
            .session
            .started_at
            .elapsed()
            .map(|d| d.as_secs_f64() / 60.0)
            .unwrap_or(0.0);
        self.publisher
            .publish(UiEvent::SessionComplete {
                stats: SessionStats {
                    cards_reviewed: self.state.cards_reviewed(),
                    ratings: dist,
                    synced_count: report.synced,
                    failed_count: report.failed,
                    duration_minutes,
                },
            })
            .await;
    }

    fn progress(&self) -> Progress {
        Progress {
            cards_reviewed: self.state.cards_reviewed(),
            cards_remaining: self.state.cards_remaining(),
        }
    }

    fn next_message_id(&self) -> String {
        crate::publisher::new_message_id()
    }
}

fn button_to_command(cmd: crate::events::ButtonCommand) -> ParsedCommand {
    use crate::events::ButtonCommand;
    let kind = match cmd {
        ButtonCommand::Hint => CommandKind::Hint,
        ButtonCommand::GiveUp => CommandKind::GiveUp,
        ButtonCommand::Next => CommandKind::Next,
        ButtonCommand::Stop => CommandKind::Stop,
        ButtonCommand::Skip => CommandKind::Skip,
        ButtonCommand::Undo => CommandKind::Undo,
        ButtonCommand::Mnemonic => CommandKind::Hint,
        ButtonCommand::Question => CommandKind::Explain,
    };
    ParsedCommand { kind, confidence: 1.0, raw: String::new(), needs_confirmation: false }
}

/// TTS await-with-timeout formula (§5): `max(15, min(30, words/150·60+5))`
/// seconds — longer utterances get more time, clamped to a 15-30s window.
fn tts_timeout_for(text: &str) -> Duration {
    let words = text.split_whitespace().count().max(1) as f32;
    let seconds = (words / 150.0 * 60.0 + 5.0).clamp(15.0, 30.0);
    Duration::from_secs_f32(seconds)
}

/// Fixed acknowledgement phrase for a command executed mid-barge-in (§4.10).
fn barge_in_ack_text(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::Skip => "Skipping.",
        CommandKind::Hint => "Here's a hint.",
        CommandKind::Stop => "Ending session.",
        CommandKind::Undo => "Undoing that.",
        _ => "Got it.",
    }
}

/// Rough token count for usage-ledger accounting (§6.5). The evaluate/hint/
/// explain response schemas (§6.3) carry no token-usage field, so this
/// crate estimates at ~4 characters per token, the commonly-cited ballpark
/// for English text — good enough for a cost estimate, not an exact bill.
fn estimate_tokens(parts: &[&str]) -> u64 {
    let chars: usize = parts.iter().map(|s| s.chars().count()).sum();
    (chars as u64 / 4).max(1)
}
