//! Timing attack protection utilities
//!
//! Failed logins are padded to a minimum duration so that response time does
//! not reveal which check rejected the attempt.

use std::time::{Duration, Instant};

/// Constant-time string comparison to prevent timing attacks
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    constant_time_eq_bytes(a.as_bytes(), b.as_bytes())
}

/// Constant-time byte array comparison
pub fn constant_time_eq_bytes(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.iter().zip(b.iter()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}

/// Authentication timing helper
#[derive(Debug)]
pub struct AuthTimer {
    start: Instant,
    min_duration: Duration,
}

impl AuthTimer {
    /// Start timing an attempt that must take at least `min_duration` when it fails
    pub fn start(min_duration: Duration) -> Self {
        Self {
            start: Instant::now(),
            min_duration,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Wait until minimum duration has elapsed
    pub async fn pad(self) {
        let elapsed = self.start.elapsed();
        if elapsed < self.min_duration {
            tokio::time::sleep(self.min_duration - elapsed).await;
        }
    }
}
