//! Concrete implementations of the [`crate::ports`] traits.
//!
//! Mirrors the teacher's provider-adapter layout (`fae_llm::providers::*`):
//! one small module per external system, each a thin `reqwest` client or an
//! in-memory fixture, selected at startup by [`crate::config::TutorConfig`]
//! rather than compiled in/out by feature flag.

pub mod llm_http;
pub mod speech_stub;
pub mod store_http;
pub mod store_local;
