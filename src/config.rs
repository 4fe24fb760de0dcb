//! Configuration for the voice tutor service.
//!
//! Layering: built-in [`Default`] impls → environment variables (§6.6 is the
//! authoritative source) → optional CLI overrides wired up by `src/bin/server.rs`.
//! Every environment variable has exactly one typed getter here; call sites
//! never touch [`std::env`] directly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, TutorError};

/// Which adapter backs the flashcard store port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashcardAdapterKind {
    /// Real HTTP-backed store client.
    Anki,
    /// In-memory/fixture adapter (demos, integration tests).
    Local,
}

impl Default for FlashcardAdapterKind {
    fn default() -> Self {
        Self::Local
    }
}

/// Deployment environment. Gates production-only behavior (CORS enforcement,
/// disabling dev-only endpoints).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        Self::Development
    }
}

/// Flashcard store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashcardPortConfig {
    pub adapter: FlashcardAdapterKind,
    pub store_url: String,
}

impl Default for FlashcardPortConfig {
    fn default() -> Self {
        Self {
            adapter: FlashcardAdapterKind::default(),
            store_url: "http://localhost:8765".to_owned(),
        }
    }
}

/// LLM port connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmPortConfig {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for LlmPortConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_owned(),
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com".to_owned(),
            request_timeout_secs: 8,
        }
    }
}

/// Speech (STT/TTS) port connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechPortConfig {
    pub stt_url: String,
    pub tts_url: String,
    pub api_key: String,
}

impl Default for SpeechPortConfig {
    fn default() -> Self {
        Self {
            stt_url: String::new(),
            tts_url: String::new(),
            api_key: String::new(),
        }
    }
}

/// Realtime transport (LiveKit-style room dispatch) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
        }
    }
}

/// Recovery store (SQLite) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub db_path: PathBuf,
    /// Purge ratings unsynced for longer than this, in days.
    pub purge_after_days: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            db_path: crate::fae_dirs::recovery_db_path(),
            purge_after_days: 7,
        }
    }
}

/// Per-endpoint-kind API rate limits (requests per 60s window).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub start: u32,
    pub end: u32,
    pub rate: u32,
    pub decks: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            start: 30,
            end: 30,
            rate: 120,
            decks: 60,
        }
    }
}

/// CORS allow-list. Empty / `*` is rejected at startup in production.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { origins: Vec::new() }
    }
}

/// HTTP API server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
        }
    }
}

/// Top-level configuration for the voice tutor service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TutorConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub flashcard: FlashcardPortConfig,
    pub llm: LlmPortConfig,
    pub speech: SpeechPortConfig,
    pub realtime: RealtimeConfig,
    pub recovery: RecoveryConfig,
    pub rate_limit: RateLimitConfig,
    pub cors: CorsConfig,
}

impl TutorConfig {
    /// Build configuration from environment variables (§6.6), validating
    /// production invariants.
    ///
    /// # Errors
    ///
    /// Returns [`TutorError::Config`] if a production deployment has no (or
    /// a wildcard) CORS allow-list — that is a fatal misconfiguration, not a
    /// silently-permissive default.
    pub fn from_env() -> Result<Self> {
        let mut config = Self {
            environment: env_environment(),
            server: ServerConfig {
                host: std::env::var("TUTOR_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned()),
                port: std::env::var("TUTOR_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8080),
            },
            flashcard: FlashcardPortConfig {
                adapter: env_flashcard_adapter(),
                store_url: std::env::var("FLASHCARD_STORE_URL")
                    .unwrap_or_else(|_| "http://localhost:8765".to_owned()),
            },
            llm: LlmPortConfig {
                model: std::env::var("GEMINI_MODEL")
                    .unwrap_or_else(|_| "gemini-1.5-flash".to_owned()),
                api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
                base_url: std::env::var("LLM_BASE_URL")
                    .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_owned()),
                request_timeout_secs: 8,
            },
            speech: SpeechPortConfig {
                stt_url: std::env::var("STT_URL").unwrap_or_default(),
                tts_url: std::env::var("TTS_URL").unwrap_or_default(),
                api_key: std::env::var("SPEECH_API_KEY").unwrap_or_default(),
            },
            realtime: RealtimeConfig {
                url: std::env::var("LIVEKIT_URL").unwrap_or_default(),
                api_key: std::env::var("LIVEKIT_API_KEY").unwrap_or_default(),
                api_secret: std::env::var("LIVEKIT_API_SECRET").unwrap_or_default(),
            },
            recovery: RecoveryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cors: CorsConfig {
                origins: env_cors_origins(),
            },
        };

        if config.environment == Environment::Production {
            let wildcard = config.cors.origins.iter().any(|o| o == "*");
            if config.cors.origins.is_empty() || wildcard {
                return Err(TutorError::Config(
                    "CORS_ORIGINS must list explicit origins in production".to_owned(),
                ));
            }
        }

        if let Ok(path) = std::env::var("RECOVERY_DB_PATH") {
            config.recovery.db_path = PathBuf::from(path);
        }

        Ok(config)
    }

    /// Inactivity timeout for a session, per §4.9 (30 min prod / 5 min dev).
    #[must_use]
    pub fn session_inactivity_timeout(&self) -> std::time::Duration {
        match self.environment {
            Environment::Production => std::time::Duration::from_secs(30 * 60),
            Environment::Development => std::time::Duration::from_secs(5 * 60),
        }
    }
}

fn env_environment() -> Environment {
    match std::env::var("ENVIRONMENT").as_deref() {
        Ok("production") => Environment::Production,
        _ => Environment::Development,
    }
}

fn env_flashcard_adapter() -> FlashcardAdapterKind {
    match std::env::var("FLASHCARD_ADAPTER").as_deref() {
        Ok("anki") => FlashcardAdapterKind::Anki,
        _ => FlashcardAdapterKind::Local,
    }
}

fn env_cors_origins() -> Vec<String> {
    std::env::var("CORS_ORIGINS")
        .ok()
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for key in [
            "ENVIRONMENT",
            "CORS_ORIGINS",
            "FLASHCARD_ADAPTER",
            "RECOVERY_DB_PATH",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn default_config_is_development() {
        clear_env();
        let config = TutorConfig::from_env().expect("dev config loads without CORS_ORIGINS");
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn production_requires_explicit_cors_origins() {
        clear_env();
        unsafe { std::env::set_var("ENVIRONMENT", "production") };
        let result = TutorConfig::from_env();
        assert!(result.is_err());
        unsafe { std::env::remove_var("ENVIRONMENT") };
    }

    #[test]
    fn production_with_wildcard_origin_is_rejected() {
        clear_env();
        unsafe { std::env::set_var("ENVIRONMENT", "production") };
        unsafe { std::env::set_var("CORS_ORIGINS", "*") };
        let result = TutorConfig::from_env();
        assert!(result.is_err());
        clear_env();
    }

    #[test]
    fn production_with_explicit_origins_succeeds() {
        clear_env();
        unsafe { std::env::set_var("ENVIRONMENT", "production") };
        unsafe { std::env::set_var("CORS_ORIGINS", "https://app.example.com,https://x.example.com") };
        let config = TutorConfig::from_env().expect("explicit origins should pass validation");
        assert_eq!(config.cors.origins.len(), 2);
        clear_env();
    }

    #[test]
    fn flashcard_adapter_defaults_to_local() {
        clear_env();
        let config = TutorConfig::from_env().expect("config loads");
        assert_eq!(config.flashcard.adapter, FlashcardAdapterKind::Local);
    }

    #[test]
    fn session_timeout_differs_by_environment() {
        let mut config = TutorConfig::default();
        config.environment = Environment::Production;
        assert_eq!(
            config.session_inactivity_timeout(),
            std::time::Duration::from_secs(1800)
        );
        config.environment = Environment::Development;
        assert_eq!(
            config.session_inactivity_timeout(),
            std::time::Duration::from_secs(300)
        );
    }

    #[test]
    fn rate_limit_defaults_match_spec() {
        let rl = RateLimitConfig::default();
        assert_eq!(rl.start, 30);
        assert_eq!(rl.end, 30);
        assert_eq!(rl.rate, 120);
        assert_eq!(rl.decks, 60);
    }
}
