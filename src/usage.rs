//! Append-only usage ledger (§6.5, §10.1).
//!
//! One JSON line per billable event: an LLM evaluate/hint/explain call, or
//! a second of STT/TTS audio. Observability only — nothing in the
//! orchestrator ever reads this file back, so writes are fire-and-forget
//! from the caller's point of view (`warn!` and move on rather than
//! propagate, mirroring how the teacher treats its own usage tracking as
//! best-effort accounting rather than a load-bearing dependency).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;

use crate::error::Result;

/// Which external service a usage entry bills against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Llm,
    Stt,
    Tts,
}

#[derive(Serialize)]
struct UsageEntry<'a> {
    ts: String,
    service: Service,
    session_id: &'a str,
    kind: &'a str,
    units: f64,
    estimated_cost: f64,
}

/// USD-per-unit pricing table. Units are tokens for the LLM, seconds of
/// audio for STT/TTS (§6.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsagePricing {
    pub llm_input_per_1k_tokens: f64,
    pub llm_output_per_1k_tokens: f64,
    pub stt_per_second: f64,
    pub tts_per_second: f64,
}

impl Default for UsagePricing {
    fn default() -> Self {
        // Ballpark Gemini 1.5 Flash-class pricing; overridable by whoever
        // constructs the ledger for a different provider/model.
        Self {
            llm_input_per_1k_tokens: 0.000_075,
            llm_output_per_1k_tokens: 0.000_30,
            stt_per_second: 0.000_6,
            tts_per_second: 0.000_6,
        }
    }
}

/// Writer for `usage.jsonl`.
///
/// One [`UsageLedger`] is shared (behind an `Arc`) across a process; the
/// internal file handle is mutex-guarded since multiple sessions append
/// concurrently.
pub struct UsageLedger {
    pricing: UsagePricing,
    file: Mutex<std::fs::File>,
}

impl UsageLedger {
    /// Opens (creating if needed) the ledger file at `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::TutorError::Io`] if the parent directory or
    /// file cannot be created.
    pub fn open(path: PathBuf, pricing: UsagePricing) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600).custom_flags(libc::O_NOFOLLOW);
        }
        let file = options.open(&path)?;
        Ok(Self { pricing, file: Mutex::new(file) })
    }

    /// Records token usage for one LLM call (`kind` is e.g. `"evaluate"`,
    /// `"hint"`, `"explain"`).
    pub fn record_llm(&self, session_id: &str, kind: &str, prompt_tokens: u64, completion_tokens: u64) {
        let units = (prompt_tokens + completion_tokens) as f64;
        let cost = (prompt_tokens as f64 / 1000.0) * self.pricing.llm_input_per_1k_tokens
            + (completion_tokens as f64 / 1000.0) * self.pricing.llm_output_per_1k_tokens;
        self.append(Service::Llm, session_id, kind, units, cost);
    }

    /// Records seconds of speech-to-text audio processed.
    pub fn record_stt(&self, session_id: &str, kind: &str, seconds: f64) {
        let cost = seconds * self.pricing.stt_per_second;
        self.append(Service::Stt, session_id, kind, seconds, cost);
    }

    /// Records seconds of text-to-speech audio synthesized.
    pub fn record_tts(&self, session_id: &str, kind: &str, seconds: f64) {
        let cost = seconds * self.pricing.tts_per_second;
        self.append(Service::Tts, session_id, kind, seconds, cost);
    }

    fn append(&self, service: Service, session_id: &str, kind: &str, units: f64, estimated_cost: f64) {
        let entry = UsageEntry { ts: Utc::now().to_rfc3339(), service, session_id, kind, units, estimated_cost };
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize usage entry");
                return;
            }
        };
        let Ok(mut file) = self.file.lock() else {
            tracing::warn!("usage ledger mutex poisoned; dropping entry");
            return;
        };
        if let Err(err) = writeln!(file, "{line}") {
            tracing::warn!(error = %err, "failed to append usage entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(path: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(path).unwrap_or_default().lines().map(str::to_owned).collect()
    }

    #[test]
    fn record_llm_appends_one_line_with_expected_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.jsonl");
        let ledger = UsageLedger::open(path.clone(), UsagePricing::default()).unwrap();

        ledger.record_llm("sess-1", "evaluate", 100, 50);

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed["service"], "llm");
        assert_eq!(parsed["session_id"], "sess-1");
        assert_eq!(parsed["kind"], "evaluate");
        assert_eq!(parsed["units"], 150.0);
        assert!(parsed["estimated_cost"].as_f64().unwrap() > 0.0);
        assert!(parsed["ts"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn record_stt_and_tts_use_seconds_as_units() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.jsonl");
        let ledger = UsageLedger::open(path.clone(), UsagePricing::default()).unwrap();

        ledger.record_stt("sess-1", "transcribe", 12.5);
        ledger.record_tts("sess-1", "synthesize", 8.0);

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        let stt: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(stt["service"], "stt");
        assert_eq!(stt["units"], 12.5);
        let tts: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(tts["service"], "tts");
        assert_eq!(tts["units"], 8.0);
    }

    #[test]
    fn appends_across_multiple_opens_of_the_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.jsonl");
        {
            let ledger = UsageLedger::open(path.clone(), UsagePricing::default()).unwrap();
            ledger.record_llm("sess-1", "evaluate", 10, 10);
        }
        {
            let ledger = UsageLedger::open(path.clone(), UsagePricing::default()).unwrap();
            ledger.record_llm("sess-1", "hint", 5, 5);
        }
        assert_eq!(read_lines(&path).len(), 2);
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("usage.jsonl");
        let ledger = UsageLedger::open(path.clone(), UsagePricing::default()).unwrap();
        ledger.record_llm("sess-1", "evaluate", 1, 1);
        assert!(path.exists());
    }
}
