use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

/// Sliding window in-memory rate limiter (single node, like the store).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled { return true; }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window { entry.pop_front(); } else { break; }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Per-action limits, keyed by the acting handle rather than by IP; every
/// write action already requires an authenticated identity.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub message_limit: usize,
    pub message_window: Duration,
    pub thread_limit: usize,
    pub thread_window: Duration,
    pub request_limit: usize,
    pub request_window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize { std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default) }
        fn dur_env(name: &str, default: u64) -> Duration { Duration::from_secs(std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)) }
        Self {
            message_limit: usize_env("RL_MESSAGE_LIMIT", 20),
            message_window: dur_env("RL_MESSAGE_WINDOW", 60),
            thread_limit: usize_env("RL_THREAD_LIMIT", 1),
            thread_window: dur_env("RL_THREAD_WINDOW", 300),
            request_limit: usize_env("RL_REQUEST_LIMIT", 5),
            request_window: dur_env("RL_REQUEST_WINDOW", 3600),
        }
    }
}

/// High level guard used by handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }
    pub fn allow_message(&self, handle: &str) -> bool { self.limiter.check(&format!("msg:{handle}"), self.cfg.message_limit, self.cfg.message_window) }
    pub fn allow_thread(&self, handle: &str) -> bool { self.limiter.check(&format!("thread:{handle}"), self.cfg.thread_limit, self.cfg.thread_window) }
    pub fn allow_request(&self, handle: &str) -> bool { self.limiter.check(&format!("req:{handle}"), self.cfg.request_limit, self.cfg.request_window) }
}
