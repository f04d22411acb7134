//! Sliding window rate limiting per session and message type.

use crate::message::MessageType;
use headless_wallet_config::RateLimitConfig;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};
use tokio::time::Instant;

/// Stale keys are pruned every this many checks.
const PRUNE_INTERVAL: u64 = 64;

#[derive(Debug, Default)]
struct Attempts {
    by_key: HashMap<(String, MessageType), VecDeque<Instant>>,
    checks: u64,
}

/// Allows at most `max_attempts` per `(session, message type)` within any window.
#[derive(Debug)]
pub struct RateLimiter {
    max_attempts: usize,
    window: Duration,
    attempts: Mutex<Attempts>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_attempts: config.max_attempts as usize,
            window: config.window(),
            attempts: Default::default(),
        }
    }

    /// Records an attempt. Fails with the time until the oldest attempt leaves the window.
    pub fn check(&self, session_id: &str, message_type: MessageType) -> Result<(), Duration> {
        let now = Instant::now();
        let mut attempts = self.attempts.lock();
        attempts.checks += 1;
        if attempts.checks.is_multiple_of(PRUNE_INTERVAL) {
            self.prune_locked(&mut attempts, now);
        }

        let history = attempts.by_key.entry((session_id.to_string(), message_type)).or_default();
        while history.front().is_some_and(|at| now.duration_since(*at) >= self.window) {
            history.pop_front();
        }
        if history.len() >= self.max_attempts {
            let retry_after = history
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            return Err(retry_after);
        }
        history.push_back(now);
        Ok(())
    }

    /// Drops keys without attempts inside the window.
    pub fn prune(&self) {
        let mut attempts = self.attempts.lock();
        self.prune_locked(&mut attempts, Instant::now());
    }

    fn prune_locked(&self, attempts: &mut Attempts, now: Instant) {
        attempts.by_key.retain(|_, history| {
            history.back().is_some_and(|last| now.duration_since(*last) < self.window)
        });
    }

    /// Forgets every attempt of `session_id`.
    pub fn reset(&self, session_id: &str) {
        self.attempts.lock().by_key.retain(|(session, _), _| session != session_id);
    }

    pub fn tracked_keys(&self) -> usize {
        self.attempts.lock().by_key.len()
    }
}
