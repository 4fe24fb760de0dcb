//! Per-client sliding window rate limiting for the public HTTP API (§5
//! "Rate limiting", §6.1).
//!
//! Same shape as the teacher's `channels::rate_limit`: a `VecDeque<Instant>`
//! sliding window per key, evict-then-check-capacity. Here the dimension is
//! `(client, endpoint kind)` instead of `(channel)`, since every client gets
//! its own budget per endpoint rather than sharing one global bucket.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::RateLimitConfig;

/// Rate limiting error.
#[derive(Debug, Clone, Error)]
pub enum RateLimitError {
    /// Rate limit exceeded; must wait before retrying.
    #[error("rate limit exceeded; retry after {retry_after_secs}s")]
    Exceeded { retry_after_secs: u64 },
}

/// Which public endpoint a request is rate limited against (§5, §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// `POST /session/start`.
    Start,
    /// `POST /session/end`.
    End,
    /// `POST /cards/{id}/rate` and `/skip`.
    Rate,
    /// `GET /decks`.
    Decks,
}

/// Sliding window over one minute, same eviction logic as the teacher's
/// `RateLimiter`.
#[derive(Debug, Clone)]
struct Window {
    max_per_minute: u32,
    hits: VecDeque<Instant>,
}

impl Window {
    fn new(max_per_minute: u32) -> Self {
        Self { max_per_minute, hits: VecDeque::new() }
    }

    fn try_hit(&mut self) -> Result<(), RateLimitError> {
        let now = Instant::now();
        let window_start = now - Duration::from_secs(60);

        while let Some(&first) = self.hits.front() {
            if first < window_start {
                self.hits.pop_front();
            } else {
                break;
            }
        }

        if self.hits.len() >= self.max_per_minute as usize {
            if let Some(&oldest) = self.hits.front() {
                let age = now.duration_since(oldest);
                let remaining = Duration::from_secs(60).saturating_sub(age);
                let retry_after_secs = remaining.as_secs().saturating_add(1);
                return Err(RateLimitError::Exceeded { retry_after_secs });
            }
        }

        self.hits.push_back(now);
        Ok(())
    }
}

/// Per-client, per-endpoint-kind rate limiter manager for the whole API
/// surface, parameterized by [`RateLimitConfig`].
#[derive(Debug)]
pub struct ApiRateLimiter {
    config: RateLimitConfig,
    windows: std::sync::Mutex<HashMap<(String, EndpointKind), Window>>,
}

impl ApiRateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config, windows: std::sync::Mutex::new(HashMap::new()) }
    }

    fn limit_for(&self, kind: EndpointKind) -> u32 {
        match kind {
            EndpointKind::Start => self.config.start,
            EndpointKind::End => self.config.end,
            EndpointKind::Rate => self.config.rate,
            EndpointKind::Decks => self.config.decks,
        }
    }

    /// Records one request from `client_id` against `kind`'s budget,
    /// returning `Err` (suitable for a 429 response) once exceeded.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned by a prior panicking
    /// holder, which would indicate a bug elsewhere in the process.
    pub fn check(&self, client_id: &str, kind: EndpointKind) -> Result<(), RateLimitError> {
        let limit = self.limit_for(kind);
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        windows
            .entry((client_id.to_owned(), kind))
            .or_insert_with(|| Window::new(limit))
            .try_hit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RateLimitConfig {
        RateLimitConfig { start: 2, end: 2, rate: 3, decks: 1 }
    }

    #[test]
    fn allows_requests_within_limit() {
        let limiter = ApiRateLimiter::new(config());
        assert!(limiter.check("client-1", EndpointKind::Start).is_ok());
        assert!(limiter.check("client-1", EndpointKind::Start).is_ok());
    }

    #[test]
    fn blocks_once_limit_exceeded() {
        let limiter = ApiRateLimiter::new(config());
        assert!(limiter.check("client-1", EndpointKind::Decks).is_ok());
        let result = limiter.check("client-1", EndpointKind::Decks);
        assert!(matches!(result, Err(RateLimitError::Exceeded { retry_after_secs }) if retry_after_secs > 0));
    }

    #[test]
    fn clients_are_isolated() {
        let limiter = ApiRateLimiter::new(config());
        assert!(limiter.check("client-1", EndpointKind::Decks).is_ok());
        assert!(limiter.check("client-1", EndpointKind::Decks).is_err());
        assert!(limiter.check("client-2", EndpointKind::Decks).is_ok());
    }

    #[test]
    fn endpoint_kinds_are_isolated_per_client() {
        let limiter = ApiRateLimiter::new(config());
        assert!(limiter.check("client-1", EndpointKind::Start).is_ok());
        assert!(limiter.check("client-1", EndpointKind::Start).is_ok());
        assert!(limiter.check("client-1", EndpointKind::Start).is_err());
        // the "end" budget for the same client is untouched
        assert!(limiter.check("client-1", EndpointKind::End).is_ok());
    }

    #[test]
    fn rate_budget_is_independently_sized() {
        let limiter = ApiRateLimiter::new(config());
        for _ in 0..3 {
            assert!(limiter.check("client-1", EndpointKind::Rate).is_ok());
        }
        assert!(limiter.check("client-1", EndpointKind::Rate).is_err());
    }
}
