//! Session record and lifecycle state machine (§3 Session, §4.9).

use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};

/// Session lifecycle states. Transitions are restricted to the table in
/// [`SessionState::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    SyncingStart,
    Active,
    Degraded,
    SyncingEnd,
    Complete,
}

impl SessionState {
    /// The exact transition table from §4.9.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{Active, Complete, Degraded, Idle, SyncingEnd, SyncingStart};
        matches!(
            (self, next),
            (Idle, SyncingStart)
                | (SyncingStart, Active)
                | (SyncingStart, Degraded)
                | (Active, SyncingEnd)
                | (Active, Degraded)
                | (Degraded, Active)
                | (Degraded, SyncingEnd)
                | (Degraded, Complete)
                | (SyncingEnd, Complete)
                | (SyncingEnd, Degraded)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// A learner's review session over one deck.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub deck_name: String,
    state: SessionState,
    pub started_at: std::time::SystemTime,
    pub last_activity: std::time::SystemTime,
}

impl Session {
    #[must_use]
    pub fn new(id: String, deck_name: String) -> Self {
        let now = std::time::SystemTime::now();
        Self {
            id,
            deck_name,
            state: SessionState::Idle,
            started_at: now,
            last_activity: now,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Attempt a lifecycle transition, validating against the §4.9 table.
    ///
    /// # Errors
    ///
    /// Returns [`TutorError::InvalidInput`] if the transition is not allowed
    /// from the current state.
    pub fn transition_to(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(TutorError::InvalidInput(format!(
                "invalid session transition {:?} -> {next:?}",
                self.state
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Touch the activity clock; called on any non-timer event per §4.7.
    pub fn touch(&mut self) {
        self.last_activity = std::time::SystemTime::now();
    }

    /// `true` if `last_activity` is older than `timeout`.
    #[must_use]
    pub fn is_expired(&self, timeout: std::time::Duration) -> bool {
        self.last_activity
            .elapsed()
            .map(|elapsed| elapsed > timeout)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::{Active, Complete, Degraded, Idle, SyncingEnd, SyncingStart};

    #[test]
    fn happy_path_transitions_are_allowed() {
        let mut s = Session::new("s1".into(), "Capitals".into());
        assert!(s.transition_to(SyncingStart).is_ok());
        assert!(s.transition_to(Active).is_ok());
        assert!(s.transition_to(SyncingEnd).is_ok());
        assert!(s.transition_to(Complete).is_ok());
        assert_eq!(s.state(), Complete);
    }

    #[test]
    fn degraded_can_resume_to_active() {
        let mut s = Session::new("s1".into(), "Capitals".into());
        s.transition_to(SyncingStart).unwrap();
        s.transition_to(Degraded).unwrap();
        assert!(s.transition_to(Active).is_ok());
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut s = Session::new("s1".into(), "Capitals".into());
        // Cannot jump straight to Active from Idle.
        assert!(s.transition_to(Active).is_err());
        assert_eq!(s.state(), Idle);
    }

    #[test]
    fn complete_is_terminal() {
        assert!(SessionState::Complete.is_terminal());
        assert!(!SessionState::Active.is_terminal());
        assert!(!Complete.can_transition_to(Active));
    }

    #[test]
    fn expiry_uses_last_activity() {
        let mut s = Session::new("s1".into(), "Capitals".into());
        assert!(!s.is_expired(std::time::Duration::from_secs(3600)));
        s.last_activity = std::time::SystemTime::now() - std::time::Duration::from_secs(10);
        assert!(s.is_expired(std::time::Duration::from_secs(5)));
        s.touch();
        assert!(!s.is_expired(std::time::Duration::from_secs(5)));
    }
}
