//! Crate-wide error type for the voice tutor service.

/// How a failure should be handled by callers: retried in the background,
/// surfaced to the user, or treated as fatal at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input from the client; rejected locally, no external call made.
    Input,
    /// External dependency hiccup; safe to retry with backoff.
    Transient,
    /// External dependency rejected the request outright; retrying won't help.
    Permanent,
    /// Session/lifecycle invariant violated (conflict, not found, expired).
    State,
    /// Process cannot continue; caller should abort startup.
    Fatal,
}

/// Top-level error type for the orchestrator and its adapters.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    /// Rejected locally: empty/unreadable answer, unknown command in context, bad rating value.
    #[error("[INVALID_INPUT] {0}")]
    InvalidInput(String),

    /// LLM port failure (evaluate/hint/explain).
    #[error("[LLM_ERROR] {0}")]
    Llm(String),

    /// Speech-to-text port failure.
    #[error("[STT_ERROR] {0}")]
    Stt(String),

    /// Text-to-speech port failure.
    #[error("[TTS_ERROR] {0}")]
    Tts(String),

    /// Flashcard store port failure.
    #[error("[STORE_ERROR] {0}")]
    Store(String),

    /// Recovery store (SQLite) failure.
    #[error("[RECOVERY_ERROR] {0}")]
    Recovery(String),

    /// `SessionConflict`: another session is already active.
    #[error("[SESSION_CONFLICT] session {existing_session_id} already active")]
    SessionConflict {
        /// The id of the session already in progress.
        existing_session_id: String,
    },

    /// `SessionNotFound`: no session with the given id.
    #[error("[SESSION_NOT_FOUND] {0}")]
    SessionNotFound(String),

    /// `SessionExpired`: session exceeded its inactivity timeout.
    #[error("[SESSION_EXPIRED] {0}")]
    SessionExpired(String),

    /// Configuration error (missing/invalid env var, bad CORS origin list, …).
    #[error("[CONFIG_ERROR] {0}")]
    Config(String),

    /// I/O error (recovery DB file, usage ledger, log files).
    #[error("[IO_ERROR] {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error between orchestrator tasks.
    #[error("[CHANNEL_ERROR] {0}")]
    Channel(String),
}

impl TutorError {
    /// Stable SCREAMING_SNAKE_CASE code for this error, for logs and API bodies.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Llm(_) => "LLM_ERROR",
            Self::Stt(_) => "STT_ERROR",
            Self::Tts(_) => "TTS_ERROR",
            Self::Store(_) => "STORE_ERROR",
            Self::Recovery(_) => "RECOVERY_ERROR",
            Self::SessionConflict { .. } => "SESSION_CONFLICT",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::SessionExpired(_) => "SESSION_EXPIRED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Channel(_) => "CHANNEL_ERROR",
        }
    }

    /// Classify this error so callers know whether to retry, surface, or abort.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidInput(_) => ErrorClass::Input,
            Self::Llm(_) | Self::Stt(_) | Self::Tts(_) | Self::Store(_) | Self::Channel(_) => {
                ErrorClass::Transient
            }
            Self::SessionConflict { .. } | Self::SessionNotFound(_) | Self::SessionExpired(_) => {
                ErrorClass::State
            }
            Self::Config(_) | Self::Recovery(_) | Self::Io(_) => ErrorClass::Fatal,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_screaming_snake_case() {
        let errs: Vec<TutorError> = vec![
            TutorError::InvalidInput("x".into()),
            TutorError::Llm("x".into()),
            TutorError::Stt("x".into()),
            TutorError::Tts("x".into()),
            TutorError::Store("x".into()),
            TutorError::Recovery("x".into()),
            TutorError::SessionConflict {
                existing_session_id: "s1".into(),
            },
            TutorError::SessionNotFound("s1".into()),
            TutorError::SessionExpired("s1".into()),
            TutorError::Config("x".into()),
            TutorError::Channel("x".into()),
        ];
        for e in errs {
            let code = e.code();
            assert_eq!(code, code.to_uppercase());
            assert!(!code.contains(' '));
        }
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert_eq!(TutorError::Llm("timeout".into()).class(), ErrorClass::Transient);
        assert_eq!(TutorError::Store("unavailable".into()).class(), ErrorClass::Transient);
    }

    #[test]
    fn state_errors_are_state_class() {
        assert_eq!(
            TutorError::SessionNotFound("s1".into()).class(),
            ErrorClass::State
        );
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TutorError>();
    }
}
