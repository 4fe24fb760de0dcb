//! Session Manager: lifecycle, single-active-session enforcement, and
//! startup crash recovery (§4.9, §4.11 C9 Session Manager).
//!
//! Owns the registry of in-flight sessions. Each session's
//! [`SessionOrchestrator`] runs in its own spawned task; this type only
//! tracks handles and enforces the invariants the orchestrator itself has
//! no visibility into (at most one active session, inactivity teardown).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::session::{Session, SessionState};
use crate::error::{Result, TutorError};
use crate::evaluation_service::EvaluationService;
use crate::events::{Event, UiEvent};
use crate::hint_service::HintService;
use crate::orchestrator::{SessionOrchestrator, SessionOutcome};
use crate::ports::{FlashcardStore, TtsPort};
use crate::recovery_store::RecoveryStore;
use crate::usage::UsageLedger;

/// A running session's handle, held by the manager so a second
/// `/session/start` can be rejected with [`TutorError::SessionConflict`]
/// (§4.9).
struct ActiveSession {
    session_id: String,
    events_tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
    handle: JoinHandle<SessionOutcome>,
}

/// Shared dependencies every session's orchestrator needs, assembled once
/// at startup from [`crate::config::TutorConfig`] and the chosen adapters.
pub struct SessionDeps {
    pub store: Arc<dyn FlashcardStore>,
    pub evaluation: Arc<EvaluationService>,
    pub hints: Arc<HintService>,
    pub recovery: Arc<RecoveryStore>,
    pub usage: Option<Arc<UsageLedger>>,
    pub tts: Arc<dyn TtsPort>,
    pub inactivity_timeout: Duration,
}

/// Enforces "exactly one active session at a time" (§4.9) and owns the
/// crash-recovery sweep run once at process startup.
pub struct SessionManager {
    deps: SessionDeps,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(deps: SessionDeps) -> Self {
        Self { deps, active: Mutex::new(None) }
    }

    /// Mark every session left in a non-terminal state as crashed (§4.11).
    /// Call once at process startup before accepting traffic.
    pub fn recover_from_crash(&self) -> Result<usize> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let recovered = self.deps.recovery.mark_crashed_sessions(now)?;
        if recovered > 0 {
            warn!(recovered, "marked sessions left over from a previous crash");
        }
        Ok(recovered)
    }

    /// Start a new session for `deck_name`. Rejects with
    /// [`TutorError::SessionConflict`] if another session is already active
    /// (§4.9's single-active-session invariant).
    pub async fn start_session(
        &self,
        deck_name: String,
        ui_tx: mpsc::Sender<UiEvent>,
    ) -> Result<(String, mpsc::Sender<Event>, CancellationToken)> {
        let mut guard = self.active.lock().await;
        if let Some(existing) = guard.as_ref() {
            if !existing.handle.is_finished() {
                return Err(TutorError::SessionConflict {
                    existing_session_id: existing.session_id.clone(),
                });
            }
        }

        let cards = self.deps.store.get_reviewable_cards(&deck_name).await?;
        let mut session = Session::new(new_session_id(), deck_name);
        session.transition_to(SessionState::SyncingStart)?;
        session.transition_to(SessionState::Active)?;

        let session_id = session.id.clone();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.deps.recovery.upsert_session(
            &session_id,
            &session.deck_name,
            "active",
            now,
            None,
            0,
            0,
            0,
        )?;

        let (events_tx, events_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        spawn_inactivity_ticker(events_tx.clone(), cancel.clone(), self.deps.inactivity_timeout);

        let orchestrator = SessionOrchestrator::new(
            session,
            cards.into(),
            Arc::clone(&self.deps.evaluation),
            Arc::clone(&self.deps.hints),
            Arc::clone(&self.deps.store),
            Arc::clone(&self.deps.recovery),
            self.deps.usage.clone(),
            Arc::clone(&self.deps.tts),
            ui_tx,
            events_rx,
            events_tx.clone(),
            cancel.clone(),
            self.deps.inactivity_timeout,
        );

        let recovery = Arc::clone(&self.deps.recovery);
        let finished_id = session_id.clone();
        let handle = tokio::spawn(async move {
            let outcome = orchestrator.run().await;
            let state = match outcome {
                SessionOutcome::Completed => "complete",
                SessionOutcome::Stopped => "complete",
                SessionOutcome::Degraded => "degraded",
                SessionOutcome::Expired => "crashed",
                SessionOutcome::ChannelClosed => "crashed",
            };
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            if let Err(err) = recovery.upsert_session(&finished_id, "", state, 0, Some(now), 0, 0, 0) {
                warn!(error = %err, session_id = %finished_id, "failed to record session end state");
            }
            info!(session_id = %finished_id, ?outcome, "session ended");
            outcome
        });

        *guard = Some(ActiveSession {
            session_id: session_id.clone(),
            events_tx: events_tx.clone(),
            cancel: cancel.clone(),
            handle,
        });

        Ok((session_id, events_tx, cancel))
    }

    /// Route an inbound event to the active session's channel.
    ///
    /// # Errors
    ///
    /// Returns [`TutorError::SessionNotFound`] if `session_id` doesn't match
    /// the active session, or [`TutorError::SessionExpired`] if the channel
    /// has already closed.
    pub async fn send_event(&self, session_id: &str, event: Event) -> Result<()> {
        let guard = self.active.lock().await;
        let active = guard
            .as_ref()
            .filter(|a| a.session_id == session_id)
            .ok_or_else(|| TutorError::SessionNotFound(session_id.to_owned()))?;
        active
            .events_tx
            .send(event)
            .await
            .map_err(|_| TutorError::SessionExpired(session_id.to_owned()))
    }

    /// Request the active session stop: cancels its event loop (§4.9 the
    /// learner pressing Stop or an external shutdown).
    pub async fn stop_session(&self, session_id: &str) -> Result<()> {
        let guard = self.active.lock().await;
        let active = guard
            .as_ref()
            .filter(|a| a.session_id == session_id)
            .ok_or_else(|| TutorError::SessionNotFound(session_id.to_owned()))?;
        active.cancel.cancel();
        Ok(())
    }

    /// `true` if a session is currently active (not yet finished).
    pub async fn has_active_session(&self) -> bool {
        let guard = self.active.lock().await;
        guard.as_ref().is_some_and(|a| !a.handle.is_finished())
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Periodically nudges the orchestrator to check `last_activity` against
/// `timeout`, ticking at a quarter of the timeout so expiry is noticed
/// promptly without flooding the event channel. Stops on cancellation or
/// once the event channel closes (session ended on its own).
fn spawn_inactivity_ticker(tx: mpsc::Sender<Event>, cancel: CancellationToken, timeout: Duration) {
    let interval = (timeout / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if tx.send(Event::Timer(crate::events::TimerKind::InactivityTick)).await.is_err() {
                        return;
                    }
                }
            }
        }
    });
}
