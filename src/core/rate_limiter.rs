//! Login rate limiting to bound credential guessing
//!
//! Attempts are counted per (identifier, client IP) key over a sliding
//! window. Keys live in an LRU cache so that a flood of distinct identifiers
//! cannot grow memory without bound.

use chrono::{DateTime, Utc};
use lru::LruCache;
use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use crate::clock::SharedClock;
use crate::config::AuthConfig;
use crate::error::{Result, RustyGuardError};

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Throttled { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// Build the limiter key for a login attempt
pub fn rate_key(identifier: &str, ip: Option<IpAddr>) -> String {
    let ip = ip.map(|ip| ip.to_string()).unwrap_or_else(|| "-".to_string());
    format!("{}|{}", identifier.trim().to_lowercase(), ip)
}

/// Sliding-window limiter for authentication attempts
pub struct LoginRateLimiter {
    attempts: Mutex<LruCache<String, VecDeque<DateTime<Utc>>>>,
    in_flight: Mutex<HashSet<String>>,
    window: chrono::Duration,
    max_attempts: usize,
    serialize_attempts: bool,
    clock: SharedClock,
}

/// Marks a login attempt as in progress for its key until dropped
pub struct AttemptGuard<'a> {
    limiter: &'a LoginRateLimiter,
    key: Option<String>,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        match self.limiter.in_flight.lock() {
            Ok(mut in_flight) => {
                in_flight.remove(&key);
            }
            Err(e) => log::error!("Rate limiter in-flight set poisoned: {}", e),
        }
    }
}

impl LoginRateLimiter {
    pub fn new(
        window: Duration,
        max_attempts: usize,
        tracked_keys: usize,
        serialize_attempts: bool,
        clock: SharedClock,
    ) -> Result<Self> {
        let capacity = NonZeroUsize::new(tracked_keys)
            .ok_or_else(|| RustyGuardError::ConfigError("Rate limiter capacity must be > 0".to_string()))?;
        let window = chrono::Duration::from_std(window)
            .map_err(|e| RustyGuardError::ConfigError(format!("Rate limit window out of range: {}", e)))?;
        if max_attempts == 0 {
            return Err(RustyGuardError::ConfigError("Max attempts must be > 0".to_string()));
        }

        Ok(Self {
            attempts: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashSet::new()),
            window,
            max_attempts,
            serialize_attempts,
            clock,
        })
    }

    pub fn from_config(config: &AuthConfig, clock: SharedClock) -> Result<Self> {
        Self::new(
            config.rate_limit_window,
            config.rate_limit_max_attempts as usize,
            config.rate_limit_tracked_keys,
            config.serialize_login_attempts,
            clock,
        )
    }

    /// Admit or throttle an attempt for `key`, recording it when admitted.
    /// The check and the record happen under one lock.
    pub fn check_and_record(&self, key: &str) -> Result<RateDecision> {
        let now = self.clock.now();
        let window_start = now - self.window;
        let mut attempts = self.attempts.lock()?;

        let times = attempts.get_or_insert_mut(key.to_string(), VecDeque::new);
        while times.front().is_some_and(|t| *t <= window_start) {
            times.pop_front();
        }

        if times.len() >= self.max_attempts {
            let retry_after = times
                .front()
                .map(|oldest| (*oldest + self.window - now).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(Duration::ZERO);
            // Round up so clients never retry early
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            let retry_after = Duration::from_secs(secs.max(1));
            log::warn!("SECURITY: Login attempts throttled for key {} ({}s)", key, retry_after.as_secs());
            return Ok(RateDecision::Throttled { retry_after });
        }

        times.push_back(now);
        Ok(RateDecision::Allowed)
    }

    /// Claim the one-attempt-at-a-time slot for `key`. Returns `None` when
    /// another attempt for the same key is still running. Always succeeds
    /// when serialization is disabled.
    pub fn begin_attempt(&self, key: &str) -> Result<Option<AttemptGuard<'_>>> {
        if !self.serialize_attempts {
            return Ok(Some(AttemptGuard {
                limiter: self,
                key: None,
            }));
        }
        let mut in_flight = self.in_flight.lock()?;
        if !in_flight.insert(key.to_string()) {
            log::warn!("SECURITY: Concurrent login attempt rejected for key {}", key);
            return Ok(None);
        }
        Ok(Some(AttemptGuard {
            limiter: self,
            key: Some(key.to_string()),
        }))
    }

    /// Forget the attempt history for `key`
    pub fn reset(&self, key: &str) -> Result<()> {
        self.attempts.lock()?.pop(key);
        Ok(())
    }

    /// Attempts currently inside the window for `key`
    pub fn attempt_count(&self, key: &str) -> Result<usize> {
        let window_start = self.clock.now() - self.window;
        let attempts = self.attempts.lock()?;
        Ok(attempts
            .peek(key)
            .map(|times| times.iter().filter(|t| **t > window_start).count())
            .unwrap_or(0))
    }

    pub fn tracked_keys(&self) -> Result<usize> {
        Ok(self.attempts.lock()?.len())
    }

    /// Drop keys whose attempts have all left the window
    pub fn cleanup(&self) -> Result<usize> {
        let window_start = self.clock.now() - self.window;
        let mut attempts = self.attempts.lock()?;
        let stale: Vec<String> = attempts
            .iter()
            .filter(|(_, times)| times.back().map_or(true, |last| *last <= window_start))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            attempts.pop(key);
        }
        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn limiter(max: usize, serialize: bool) -> (LoginRateLimiter, ManualClock) {
        let clock = ManualClock::starting_now();
        let limiter =
            LoginRateLimiter::new(Duration::from_secs(60), max, 100, serialize, Arc::new(clock.clone())).unwrap();
        (limiter, clock)
    }

    #[test]
    fn test_throttles_after_threshold() {
        let (limiter, _clock) = limiter(3, false);
        for _ in 0..3 {
            assert!(limiter.check_and_record("alice|1.2.3.4").unwrap().is_allowed());
        }
        assert_eq!(
            limiter.check_and_record("alice|1.2.3.4").unwrap(),
            RateDecision::Throttled {
                retry_after: Duration::from_secs(60)
            }
        );
        // Other keys are unaffected
        assert!(limiter.check_and_record("bob|1.2.3.4").unwrap().is_allowed());
    }

    #[test]
    fn test_window_slides() {
        let (limiter, clock) = limiter(2, false);
        limiter.check_and_record("k").unwrap();
        clock.advance(chrono::Duration::seconds(30));
        limiter.check_and_record("k").unwrap();

        clock.advance(chrono::Duration::seconds(20));
        match limiter.check_and_record("k").unwrap() {
            RateDecision::Throttled { retry_after } => assert_eq!(retry_after, Duration::from_secs(10)),
            other => panic!("expected throttle, got {:?}", other),
        }

        // First attempt leaves the window
        clock.advance(chrono::Duration::seconds(10));
        assert!(limiter.check_and_record("k").unwrap().is_allowed());
        assert!(!limiter.check_and_record("k").unwrap().is_allowed());
    }

    #[test]
    fn test_reset_clears_history() {
        let (limiter, _clock) = limiter(1, false);
        limiter.check_and_record("k").unwrap();
        assert!(!limiter.check_and_record("k").unwrap().is_allowed());
        limiter.reset("k").unwrap();
        assert!(limiter.check_and_record("k").unwrap().is_allowed());
    }

    #[test]
    fn test_tracked_keys_bounded() {
        let clock = ManualClock::starting_now();
        let limiter = LoginRateLimiter::new(Duration::from_secs(60), 5, 3, false, Arc::new(clock)).unwrap();
        for i in 0..10 {
            limiter.check_and_record(&format!("user{}", i)).unwrap();
        }
        assert_eq!(limiter.tracked_keys().unwrap(), 3);
    }

    #[test]
    fn test_cleanup_removes_idle_keys() {
        let (limiter, clock) = limiter(5, false);
        limiter.check_and_record("old").unwrap();
        clock.advance(chrono::Duration::seconds(61));
        limiter.check_and_record("new").unwrap();

        assert_eq!(limiter.cleanup().unwrap(), 1);
        assert_eq!(limiter.tracked_keys().unwrap(), 1);
        assert_eq!(limiter.attempt_count("new").unwrap(), 1);
    }

    #[test]
    fn test_serialized_attempts() {
        let (limiter, _clock) = limiter(5, true);
        let guard = limiter.begin_attempt("k").unwrap();
        assert!(guard.is_some());
        assert!(limiter.begin_attempt("k").unwrap().is_none());
        assert!(limiter.begin_attempt("other").unwrap().is_some());
        drop(guard);
        assert!(limiter.begin_attempt("k").unwrap().is_some());
    }

    #[test]
    fn test_unserialized_attempts_always_admitted() {
        let (limiter, _clock) = limiter(5, false);
        let _first = limiter.begin_attempt("k").unwrap().unwrap();
        assert!(limiter.begin_attempt("k").unwrap().is_some());
    }

    #[test]
    fn test_rate_key_normalizes_identifier() {
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(rate_key(" Alice ", Some(ip)), "alice|10.0.0.1");
        assert_eq!(rate_key("alice", None), "alice|-");
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let clock: SharedClock = Arc::new(ManualClock::starting_now());
        assert!(LoginRateLimiter::new(Duration::from_secs(60), 5, 0, false, clock).is_err());
    }
}
