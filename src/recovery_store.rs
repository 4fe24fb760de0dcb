//! Durable recovery store for unsynced ratings and session history (§4.11
//! C11 Recovery Store, §6.5).
//!
//! SQLite-backed, WAL journaling, a single [`Mutex`] serializing writes
//! (mirrors the teacher's `SqliteMemoryRepository`: reads could in
//! principle proceed concurrently under WAL, but a single mutex keeps the
//! implementation simple and is not a measured bottleneck at this scale).

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::domain::card::Rating;
use crate::error::{Result, TutorError};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS pending_reviews (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    card_id     INTEGER NOT NULL,
    ease        INTEGER NOT NULL,
    timestamp   INTEGER NOT NULL,
    session_id  TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    synced_at   INTEGER
);

CREATE INDEX IF NOT EXISTS idx_pending_reviews_unsynced
    ON pending_reviews(synced_at)
    WHERE synced_at IS NULL;

CREATE TABLE IF NOT EXISTS sessions (
    id              TEXT PRIMARY KEY,
    deck_name       TEXT NOT NULL,
    state           TEXT NOT NULL,
    started_at      INTEGER NOT NULL,
    ended_at        INTEGER,
    cards_reviewed  INTEGER NOT NULL DEFAULT 0,
    ratings_synced  INTEGER NOT NULL DEFAULT 0,
    ratings_failed  INTEGER NOT NULL DEFAULT 0
);
"#;

/// One unsynced (or previously-failed) rating row.
#[derive(Debug, Clone)]
pub struct PendingReview {
    pub id: i64,
    pub card_id: u64,
    pub ease: Rating,
    pub timestamp: i64,
    pub session_id: String,
    pub retry_count: u32,
}

/// Durable recovery store. Opens (or creates) the SQLite database at the
/// configured path and applies the schema above; safe to call repeatedly
/// since every statement is `IF NOT EXISTS`.
pub struct RecoveryStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for RecoveryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryStore").finish_non_exhaustive()
    }
}

impl RecoveryStore {
    /// Open (or create) the recovery database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TutorError::Recovery`] if the database cannot be opened or
    /// the schema cannot be applied — a fatal condition per §7.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| TutorError::Recovery(format!("open {}: {e}", path.display())))?;
        conn.pragma_update(None, "cache_size", -64_000)
            .map_err(|e| TutorError::Recovery(format!("set cache_size: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| TutorError::Recovery(format!("apply schema: {e}")))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store for tests and the `local` demo adapter path.
    ///
    /// # Errors
    ///
    /// Returns [`TutorError::Recovery`] if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TutorError::Recovery(format!("open in-memory db: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| TutorError::Recovery(format!("apply schema: {e}")))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Append a rating the moment it is recorded (§4.11: "ratings are
    /// appended to C11 the moment they are recorded").
    pub fn record_pending_review(
        &self,
        card_id: u64,
        session_id: &str,
        rating: Rating,
        timestamp: i64,
    ) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pending_reviews (card_id, ease, timestamp, session_id, retry_count)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![card_id, rating.as_u8(), timestamp, session_id],
        )
        .map_err(|e| TutorError::Recovery(format!("insert pending review: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    /// All rows not yet marked synced, oldest first.
    pub fn unsynced_reviews(&self) -> Result<Vec<PendingReview>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, card_id, ease, timestamp, session_id, retry_count
                 FROM pending_reviews WHERE synced_at IS NULL ORDER BY id ASC",
            )
            .map_err(|e| TutorError::Recovery(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                let ease: u8 = row.get(2)?;
                Ok(PendingReview {
                    id: row.get(0)?,
                    card_id: row.get(1)?,
                    ease: Rating::from_u8(ease).unwrap_or(Rating::Hard),
                    timestamp: row.get(3)?,
                    session_id: row.get(4)?,
                    retry_count: row.get(5)?,
                })
            })
            .map_err(|e| TutorError::Recovery(e.to_string()))?;
        rows.collect::<std::result::Result<_, _>>()
            .map_err(|e| TutorError::Recovery(e.to_string()))
    }

    /// Mark a row synced at `now`.
    pub fn mark_synced(&self, id: i64, now: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("UPDATE pending_reviews SET synced_at = ?1 WHERE id = ?2", params![now, id])
            .map_err(|e| TutorError::Recovery(e.to_string()))?;
        Ok(())
    }

    /// Increment the retry counter after a failed (but still transient)
    /// sync attempt.
    pub fn bump_retry_count(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE pending_reviews SET retry_count = retry_count + 1 WHERE id = ?1",
            params![id],
        )
        .map_err(|e| TutorError::Recovery(e.to_string()))?;
        Ok(())
    }

    /// Purge rows unsynced for longer than `max_age_secs`, returning the
    /// number of rows removed. Callers log a warning per §4.11.
    pub fn purge_stale(&self, now: i64, max_age_secs: i64) -> Result<usize> {
        let conn = self.lock()?;
        let cutoff = now - max_age_secs;
        let removed = conn
            .execute(
                "DELETE FROM pending_reviews WHERE synced_at IS NULL AND timestamp < ?1",
                params![cutoff],
            )
            .map_err(|e| TutorError::Recovery(e.to_string()))?;
        if removed > 0 {
            warn!(removed, "purged stale unsynced ratings beyond the retention window");
        }
        Ok(removed)
    }

    /// Upsert a session row's lifecycle snapshot (§4.11 `sessions` table).
    #[allow(clippy::too_many_arguments)]
    pub fn upsert_session(
        &self,
        id: &str,
        deck_name: &str,
        state: &str,
        started_at: i64,
        ended_at: Option<i64>,
        cards_reviewed: u32,
        ratings_synced: u32,
        ratings_failed: u32,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (id, deck_name, state, started_at, ended_at, cards_reviewed, ratings_synced, ratings_failed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                ended_at = excluded.ended_at,
                cards_reviewed = excluded.cards_reviewed,
                ratings_synced = excluded.ratings_synced,
                ratings_failed = excluded.ratings_failed",
            params![id, deck_name, state, started_at, ended_at, cards_reviewed, ratings_synced, ratings_failed],
        )
        .map_err(|e| TutorError::Recovery(e.to_string()))?;
        Ok(())
    }

    /// On startup, mark every session left in a non-terminal state as
    /// `crashed` (§4.11). Returns the number of rows updated.
    pub fn mark_crashed_sessions(&self, now: i64) -> Result<usize> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE sessions SET state = 'crashed', ended_at = ?1
                 WHERE state NOT IN ('complete', 'crashed', 'degraded')",
                params![now],
            )
            .map_err(|e| TutorError::Recovery(e.to_string()))?;
        Ok(updated)
    }

    /// Current lifecycle state string for a session, if it exists.
    pub fn session_state(&self, id: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        conn.query_row("SELECT state FROM sessions WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .map_err(|e| TutorError::Recovery(e.to_string()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TutorError::Recovery("recovery store mutex poisoned".into()))
    }
}
