//! Idempotent-dispatch cache for `POST /livekit/token` (§5, §6.1).
//!
//! A learner's client can retry the token request (reconnects, duplicate
//! clicks) without re-dispatching a second agent into the same room.
//! Entries expire after five minutes and the map is capped so a flood of
//! distinct rooms can't grow it without bound — the same "bounded and
//! time-expired" shape the teacher's sliding-window rate limiter uses for
//! its own cache ([`crate::rate_limit`]), applied here to dispatch
//! timestamps instead of hit counts.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DISPATCH_TTL: Duration = Duration::from_secs(5 * 60);

/// Hard cap on tracked rooms; oldest entries are evicted first once hit.
const MAX_ENTRIES: usize = 10_000;

/// Tracks which rooms have already had an agent dispatched recently.
pub struct DispatchCache {
    dispatched: Mutex<HashMap<String, Instant>>,
}

impl Default for DispatchCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchCache {
    #[must_use]
    pub fn new() -> Self {
        Self { dispatched: Mutex::new(HashMap::new()) }
    }

    /// Returns `true` if an agent should be dispatched into `room`: either
    /// no dispatch is on record, or the prior one has aged out. Marks the
    /// room as dispatched as a side effect, so a double caller racing on
    /// the same room only gets `true` once (the mutex provides the "room
    /// lock" §6.1 calls for).
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned by a prior panicking
    /// holder, which would indicate a bug elsewhere in the process.
    pub fn should_dispatch(&self, room: &str) -> bool {
        let now = Instant::now();
        let mut dispatched = self.dispatched.lock().expect("dispatch cache mutex poisoned");

        dispatched.retain(|_, at| now.duration_since(*at) < DISPATCH_TTL);

        match dispatched.get(room) {
            Some(at) if now.duration_since(*at) < DISPATCH_TTL => false,
            _ => {
                if dispatched.len() >= MAX_ENTRIES {
                    if let Some(oldest_room) =
                        dispatched.iter().min_by_key(|(_, at)| **at).map(|(room, _)| room.clone())
                    {
                        dispatched.remove(&oldest_room);
                    }
                }
                dispatched.insert(room.to_owned(), now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_dispatch_to_a_room_is_allowed() {
        let cache = DispatchCache::new();
        assert!(cache.should_dispatch("room-1"));
    }

    #[test]
    fn second_dispatch_within_ttl_is_suppressed() {
        let cache = DispatchCache::new();
        assert!(cache.should_dispatch("room-1"));
        assert!(!cache.should_dispatch("room-1"));
    }

    #[test]
    fn distinct_rooms_are_independent() {
        let cache = DispatchCache::new();
        assert!(cache.should_dispatch("room-1"));
        assert!(cache.should_dispatch("room-2"));
    }

    #[test]
    fn eviction_keeps_the_map_bounded() {
        let cache = DispatchCache::new();
        {
            let mut dispatched = cache.dispatched.lock().unwrap();
            for i in 0..MAX_ENTRIES {
                dispatched.insert(format!("room-{i}"), Instant::now());
            }
        }
        assert!(cache.should_dispatch("room-overflow"));
        assert_eq!(cache.dispatched.lock().unwrap().len(), MAX_ENTRIES);
    }
}
