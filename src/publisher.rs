//! UI Event Publisher: ordered, typed event stream to the client, with
//! assistant-text deduplication and speaking-state bracketing (§4.8).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::trace;

use crate::events::UiEvent;

/// How long a published-text hash is remembered before it can be published
/// again (§4.8: "entries expire after 30 s").
const DEDUP_TTL: Duration = Duration::from_secs(30);

/// Prefix length (in characters) hashed for the dedup key.
const DEDUP_PREFIX_CHARS: usize = 30;

struct DedupEntry {
    hash: String,
    published_at: Instant,
}

/// Publishes [`UiEvent`]s onto a per-session channel, preserving the order
/// the orchestrator produced them in (§4.8, §5 Ordering guarantees).
///
/// Deduplication: once an assistant message has been published, its
/// 16-hex-char hash is remembered for 30s; a second publish attempt for the
/// same text within that window (e.g. a transport "conversation item
/// committed" echo) is suppressed.
pub struct UiPublisher {
    tx: mpsc::Sender<UiEvent>,
    recent_hashes: VecDeque<DedupEntry>,
}

impl UiPublisher {
    #[must_use]
    pub fn new(tx: mpsc::Sender<UiEvent>) -> Self {
        Self { tx, recent_hashes: VecDeque::new() }
    }

    /// Publish an event verbatim — used for everything except assistant
    /// text, which goes through [`UiPublisher::publish_agent_message`] so
    /// the dedup cache sees it.
    pub async fn publish(&mut self, event: UiEvent) {
        if let Err(err) = self.tx.send(event).await {
            trace!(%err, "ui event receiver dropped; session is tearing down");
        }
    }

    /// Publish an `agent_message`, suppressing it if the same text (by
    /// 30-char prefix hash) was already published within the last 30s.
    /// Returns `true` if the message was actually published.
    pub async fn publish_agent_message(&mut self, text: String, id: String) -> bool {
        self.prune_expired();
        let hash = hash_prefix(&text);
        if self.recent_hashes.iter().any(|e| e.hash == hash) {
            trace!(%hash, "suppressing duplicate agent_message publish");
            return false;
        }
        self.recent_hashes.push_back(DedupEntry { hash, published_at: Instant::now() });
        self.publish(UiEvent::AgentMessage { text, id }).await;
        true
    }

    /// Wrap a TTS utterance: publish the speaking-state event. The caller
    /// is responsible for publishing the message text *before* calling this
    /// with `speaking: true`, per §4.8 ("the text is published before TTS
    /// begins so the UI displays it instantly").
    pub async fn publish_speaking_state(&mut self, speaking: bool) {
        self.publish(UiEvent::AgentSpeakingState { speaking }).await;
    }

    fn prune_expired(&mut self) {
        let now = Instant::now();
        while let Some(front) = self.recent_hashes.front() {
            if now.duration_since(front.published_at) > DEDUP_TTL {
                self.recent_hashes.pop_front();
            } else {
                break;
            }
        }
    }
}

/// 16-hex-char hash of the first 30 characters of `text` (§4.8).
fn hash_prefix(text: &str) -> String {
    let prefix: String = text.chars().take(DEDUP_PREFIX_CHARS).collect();
    let digest = Sha256::digest(prefix.as_bytes());
    let full_hex = format!("{digest:x}");
    full_hex[..16].to_owned()
}

/// Generate a unique id for an `agent_message` event (§4.8, §6.2 — "ULID;
/// de-duped"). Uses UUID v4 rather than a literal ULID implementation,
/// since no ULID crate is part of the adopted stack; both are
/// collision-resistant opaque ids and the wire contract only requires
/// uniqueness.
#[must_use]
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (UiPublisher, mpsc::Receiver<UiEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (UiPublisher::new(tx), rx)
    }

    #[tokio::test]
    async fn events_are_received_in_publish_order() {
        let (mut publisher, mut rx) = channel();
        publisher.publish(UiEvent::PttState { recording: true }).await;
        publisher.publish(UiEvent::PttState { recording: false }).await;
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        matches!(first, UiEvent::PttState { recording: true });
        matches!(second, UiEvent::PttState { recording: false });
    }

    #[tokio::test]
    async fn duplicate_agent_message_within_window_is_suppressed() {
        let (mut publisher, mut rx) = channel();
        let published = publisher.publish_agent_message("Nice work!".into(), "id-1".into()).await;
        assert!(published);
        let published_again =
            publisher.publish_agent_message("Nice work!".into(), "id-2".into()).await;
        assert!(!published_again);
        // Only the first publish should have reached the channel.
        let event = rx.recv().await.unwrap();
        matches!(event, UiEvent::AgentMessage { .. });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn distinct_text_is_not_suppressed() {
        let (mut publisher, _rx) = channel();
        assert!(publisher.publish_agent_message("Nice work!".into(), "id-1".into()).await);
        assert!(publisher.publish_agent_message("Try again.".into(), "id-2".into()).await);
    }

    #[test]
    fn hash_prefix_is_16_hex_chars() {
        let hash = hash_prefix("some assistant text that is long");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_prefix_only_considers_first_30_chars() {
        let a = "x".repeat(30) + "AAAA";
        let b = "x".repeat(30) + "BBBB";
        assert_eq!(hash_prefix(&a), hash_prefix(&b));
    }

    #[test]
    fn message_ids_are_unique() {
        let a = new_message_id();
        let b = new_message_id();
        assert_ne!(a, b);
    }
}
