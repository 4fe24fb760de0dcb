//! No-op [`SttPort`]/[`TtsPort`] seam implementations.
//!
//! Speech transcription and synthesis are out of scope for this crate (§1):
//! it consumes already-transcribed text and hands off already-generated
//! audio elsewhere. These stubs exist only so `src/bin/server.rs` can wire
//! a complete dependency graph without a real speech backend configured,
//! the same way the teacher's `local_probe` module stands in when no local
//! LLM endpoint is reachable.

use async_trait::async_trait;

use crate::domain::Transcript;
use crate::error::{Result, TutorError};
use crate::ports::{SttPort, TtsPort};

pub struct NullSttAdapter;

#[async_trait]
impl SttPort for NullSttAdapter {
    async fn transcribe(&self, _audio: &[u8]) -> Result<Transcript> {
        Err(TutorError::Stt("speech-to-text is not configured for this deployment".into()))
    }
}

pub struct NullTtsAdapter;

#[async_trait]
impl TtsPort for NullTtsAdapter {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
        Err(TutorError::Tts("text-to-speech is not configured for this deployment".into()))
    }
}
