//! Sync Orchestrator: replays ratings recorded in the recovery store but
//! not yet accepted by the flashcard store (§4.11 C10, §7 Resilience).
//!
//! Mirrors the teacher's agent-loop retry policy (`fae_llm::agent::types::
//! RetryPolicy`): exponential backoff with jitter, a bounded attempt count,
//! and a hard split between errors worth retrying and ones that are not.
//! Unlike the teacher's in-memory retry loop, every attempt here is driven
//! off rows a SQLite table owns, so a process restart mid-retry loses no
//! work — the next [`SyncOrchestrator::replay_pending`] call picks the row
//! back up from `retry_count`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::TutorError;
use crate::ports::FlashcardStore;
use crate::recovery_store::{PendingReview, RecoveryStore};

/// Base delay before the first retry (§4.11: "2s, 4s, 8s... capped at 30s").
const BASE_DELAY_MS: f64 = 2000.0;
/// Backoff never waits longer than this between attempts.
const MAX_DELAY_MS: f64 = 30_000.0;
/// Upper bound on random jitter added to each delay (§4.11: "jitter ≤1s").
const MAX_JITTER_MS: f64 = 1000.0;
/// Default number of attempts per rating before giving up for this pass
/// (§4.11: "max 3 attempts").
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Outcome of one replay pass, for logging and `/session/end` stats.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncReport {
    pub synced: u32,
    pub failed: u32,
}

enum SyncOutcome {
    Synced,
    /// The store rejected the rating outright; retrying will not help.
    Permanent,
    /// Every attempt this pass hit a transient error; still pending.
    TransientExhausted,
}

/// Replays [`RecoveryStore`] rows against a [`FlashcardStore`] with backoff.
pub struct SyncOrchestrator {
    store: Arc<dyn FlashcardStore>,
    recovery: Arc<RecoveryStore>,
    max_attempts: u32,
    purge_after_days: u32,
}

impl SyncOrchestrator {
    #[must_use]
    pub fn new(store: Arc<dyn FlashcardStore>, recovery: Arc<RecoveryStore>, purge_after_days: u32) -> Self {
        Self { store, recovery, max_attempts: DEFAULT_MAX_ATTEMPTS, purge_after_days }
    }

    /// Override the per-pass attempt cap (tests only need this to avoid
    /// waiting through real backoff delays).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Replay every unsynced rating once, then purge ratings that have
    /// aged out of the retention window (§4.11). Called at session end and
    /// once at process startup before accepting traffic.
    ///
    /// # Errors
    ///
    /// Returns [`TutorError::Recovery`] if the recovery store itself is
    /// unreachable — a fatal condition distinct from an individual rating
    /// failing to sync.
    pub async fn replay_pending(&self) -> crate::error::Result<SyncReport> {
        let pending = self.recovery.unsynced_reviews()?;
        let mut report = SyncReport::default();

        for review in &pending {
            match self.sync_one(review).await {
                SyncOutcome::Synced => {
                    self.recovery.mark_synced(review.id, now())?;
                    report.synced += 1;
                }
                SyncOutcome::Permanent => {
                    warn!(
                        card_id = review.card_id,
                        review_id = review.id,
                        "rating permanently rejected by flashcard store; leaving for manual review"
                    );
                    self.recovery.bump_retry_count(review.id)?;
                    report.failed += 1;
                }
                SyncOutcome::TransientExhausted => {
                    warn!(
                        card_id = review.card_id,
                        review_id = review.id,
                        "rating still unsynced after {} attempts this pass",
                        self.max_attempts
                    );
                    self.recovery.bump_retry_count(review.id)?;
                    report.failed += 1;
                }
            }
        }

        let purged = self
            .recovery
            .purge_stale(now(), i64::from(self.purge_after_days) * 86_400)?;
        if purged > 0 {
            warn!(purged, "dropped ratings unsynced beyond the retention window");
        }

        if report.synced > 0 || report.failed > 0 {
            info!(synced = report.synced, failed = report.failed, "sync pass complete");
        }
        Ok(report)
    }

    async fn sync_one(&self, review: &PendingReview) -> SyncOutcome {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = self.store.submit_review(review.card_id, &review.session_id, review.ease).await;
            match result {
                Ok(()) => return SyncOutcome::Synced,
                Err(err) if !is_transient(&err) => return SyncOutcome::Permanent,
                Err(_) if attempt >= self.max_attempts => return SyncOutcome::TransientExhausted,
                Err(_) => tokio::time::sleep(backoff_delay(attempt)).await,
            }
        }
    }
}

/// Auth/validation failures are permanent (§7); anything that looks like a
/// network hiccup (timeout, connection refused, "unavailable") is worth
/// retrying. Adapters spell these out in the error message text (see
/// [`crate::adapters::store_http`]) since [`TutorError::class`] alone
/// cannot distinguish a permanent store rejection from a transient one.
fn is_transient(err: &TutorError) -> bool {
    match err {
        TutorError::Store(msg) => {
            let lower = msg.to_lowercase();
            lower.contains("timeout") || lower.contains("unavailable") || lower.contains("connection") || lower.contains("network")
        }
        _ => matches!(err.class(), crate::error::ErrorClass::Transient),
    }
}

/// `min(base * 2^(attempt-1), max) + jitter`, jitter uniform in `[0, 1s)`.
/// Mirrors the teacher's `RetryPolicy::delay_for_attempt`, with this
/// system's absolute 1s jitter cap instead of a percentage of the delay.
fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let delay = (BASE_DELAY_MS * 2f64.powi(exponent as i32)).min(MAX_DELAY_MS);
    let jitter = rand::random::<f64>() * MAX_JITTER_MS;
    Duration::from_millis((delay + jitter) as u64)
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::card::{Card, Rating};
    use crate::error::Result;
    use crate::ports::DeckSummary;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysOkStore;

    #[async_trait]
    impl FlashcardStore for AlwaysOkStore {
        async fn get_decks(&self) -> Result<Vec<DeckSummary>> {
            Ok(vec![])
        }
        async fn get_decks_with_card_counts(&self) -> Result<Vec<DeckSummary>> {
            Ok(vec![])
        }
        async fn get_reviewable_cards(&self, _deck: &str) -> Result<Vec<Card>> {
            Ok(vec![])
        }
        async fn submit_review(&self, _card_id: u64, _session_id: &str, _rating: Rating) -> Result<()> {
            Ok(())
        }
        async fn get_card_image(&self, _filename: &str) -> Result<Vec<u8>> {
            Err(TutorError::Store("no images".into()))
        }
    }

    struct PermanentlyFailingStore;

    #[async_trait]
    impl FlashcardStore for PermanentlyFailingStore {
        async fn get_decks(&self) -> Result<Vec<DeckSummary>> {
            Ok(vec![])
        }
        async fn get_decks_with_card_counts(&self) -> Result<Vec<DeckSummary>> {
            Ok(vec![])
        }
        async fn get_reviewable_cards(&self, _deck: &str) -> Result<Vec<Card>> {
            Ok(vec![])
        }
        async fn submit_review(&self, _card_id: u64, _session_id: &str, _rating: Rating) -> Result<()> {
            Err(TutorError::Store("submit_review returned 401 Unauthorized".into()))
        }
        async fn get_card_image(&self, _filename: &str) -> Result<Vec<u8>> {
            Err(TutorError::Store("no images".into()))
        }
    }

    /// Fails transiently until the N-th call, then succeeds.
    struct FlakyStore {
        succeed_after: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl FlashcardStore for FlakyStore {
        async fn get_decks(&self) -> Result<Vec<DeckSummary>> {
            Ok(vec![])
        }
        async fn get_decks_with_card_counts(&self) -> Result<Vec<DeckSummary>> {
            Ok(vec![])
        }
        async fn get_reviewable_cards(&self, _deck: &str) -> Result<Vec<Card>> {
            Ok(vec![])
        }
        async fn submit_review(&self, _card_id: u64, _session_id: &str, _rating: Rating) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.succeed_after {
                Ok(())
            } else {
                Err(TutorError::Store("connection unavailable".into()))
            }
        }
        async fn get_card_image(&self, _filename: &str) -> Result<Vec<u8>> {
            Err(TutorError::Store("no images".into()))
        }
    }

    fn recovery_with_one_pending() -> Arc<RecoveryStore> {
        let store = RecoveryStore::open_in_memory().unwrap();
        store.record_pending_review(1, "sess-1", Rating::Good, 0).unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn successful_submit_marks_the_row_synced() {
        let recovery = recovery_with_one_pending();
        let orchestrator = SyncOrchestrator::new(Arc::new(AlwaysOkStore), Arc::clone(&recovery), 7);
        let report = orchestrator.replay_pending().await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(report.failed, 0);
        assert!(recovery.unsynced_reviews().unwrap().is_empty());
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried_and_stays_pending() {
        let recovery = recovery_with_one_pending();
        let orchestrator =
            SyncOrchestrator::new(Arc::new(PermanentlyFailingStore), Arc::clone(&recovery), 7)
                .with_max_attempts(3);
        let report = orchestrator.replay_pending().await.unwrap();
        assert_eq!(report.synced, 0);
        assert_eq!(report.failed, 1);
        let pending = recovery.unsynced_reviews().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 1);
    }

    #[tokio::test]
    async fn transient_failure_retries_until_exhausted_with_one_attempt_cap() {
        let recovery = recovery_with_one_pending();
        let store = Arc::new(FlakyStore { succeed_after: 5, calls: AtomicU32::new(0) });
        let orchestrator = SyncOrchestrator::new(store, Arc::clone(&recovery), 7).with_max_attempts(1);
        let report = orchestrator.replay_pending().await.unwrap();
        assert_eq!(report.synced, 0);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn transient_failure_recovers_within_attempt_budget() {
        let recovery = recovery_with_one_pending();
        let store = Arc::new(FlakyStore { succeed_after: 2, calls: AtomicU32::new(0) });
        let orchestrator = SyncOrchestrator::new(store, Arc::clone(&recovery), 7).with_max_attempts(3);
        let report = orchestrator.replay_pending().await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn backoff_delay_is_capped_at_30s_plus_jitter() {
        let delay = backoff_delay(10);
        assert!(delay <= Duration::from_millis(31_000));
        assert!(delay >= Duration::from_millis(30_000));
    }

    #[test]
    fn backoff_delay_grows_exponentially_before_the_cap() {
        let first = backoff_delay(1);
        let second = backoff_delay(2);
        assert!(first < Duration::from_millis(3_000));
        assert!(second >= Duration::from_millis(4_000));
        assert!(second < Duration::from_millis(5_000));
    }

    #[test]
    fn transient_messages_are_classified_as_transient() {
        assert!(is_transient(&TutorError::Store("connection timeout".into())));
        assert!(is_transient(&TutorError::Store("service unavailable".into())));
        assert!(!is_transient(&TutorError::Store("400 Bad Request: invalid card id".into())));
    }
}
