//! Voice-first spaced-repetition flashcard tutor: a session orchestrator
//! that drives a learner through a deck by voice, grades answers with an
//! LLM, and keeps ratings durable across crashes until they land in the
//! flashcard store.
//!
//! The crate is organized as a small event-sourced core wrapped by a thin
//! HTTP/websocket transport:
//!
//! - [`domain`] — pure types and transition functions (cards, sessions,
//!   evaluation results, per-card voice state). No I/O.
//! - [`command_parser`], [`turn_detector`], [`sanitizer`] — pure text
//!   processing used by the orchestrator.
//! - [`evaluation_service`], [`hint_service`] — thin wrappers around
//!   [`ports::LlmPort`] that apply domain overrides and static fallbacks.
//! - [`orchestrator`] — the single-threaded event loop driving one session.
//! - [`session_manager`] — lifecycle/registry: at most one active session,
//!   inactivity teardown, crash recovery on startup.
//! - [`sync_orchestrator`] — replays unsynced ratings from the recovery
//!   store against the flashcard store with backoff.
//! - [`recovery_store`] — durable SQLite-backed record of pending ratings
//!   and session lifecycle state.
//! - [`publisher`], [`events`] — the outbound UI event stream and its wire
//!   format.
//! - [`ports`] — trait seams for the LLM, flashcard store, STT and TTS
//!   collaborators this crate treats as external; [`adapters`] holds the
//!   concrete implementations.
//! - [`api`] — the HTTP + realtime data channel surface.
//! - [`config`], [`error`], [`fae_dirs`] — ambient configuration, the
//!   crate-wide error type, and filesystem path resolution.
//! - [`usage`], [`rate_limit`], [`livekit_cache`], [`diagnostics`] —
//!   supporting ambient services: usage ledger, API rate limiting,
//!   realtime-room dispatch dedup, and support diagnostic bundles.

pub mod adapters;
pub mod api;
pub mod command_parser;
pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod error;
pub mod evaluation_service;
pub mod events;
pub mod fae_dirs;
pub mod hint_service;
pub mod livekit_cache;
pub mod orchestrator;
pub mod ports;
pub mod publisher;
pub mod rate_limit;
pub mod recovery_store;
pub mod sanitizer;
pub mod session_manager;
pub mod sync_orchestrator;
pub mod turn_detector;
pub mod usage;

pub use config::TutorConfig;
pub use error::{Result, TutorError};
pub use orchestrator::{SessionOrchestrator, SessionOutcome};
pub use session_manager::{SessionDeps, SessionManager};
