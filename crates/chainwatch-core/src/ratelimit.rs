//! Per-rule token-bucket rate limiter.
//!
//! Real-valued tokens accrue at `rate` per second up to `capacity`; each
//! allowed alert consumes one token. The bucket starts full. State is
//! in-memory only: rate limiting intentionally does not survive restarts.

use std::time::Instant;

/// A token bucket.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    rate: f64,
    tokens: f64,
    last_update: Option<Instant>,
}

impl TokenBucket {
    pub fn new(capacity: f64, rate: f64) -> Self {
        Self {
            capacity,
            rate,
            tokens: capacity,
            last_update: None,
        }
    }

    /// Refill for the elapsed time, then consume one token if available.
    ///
    /// `now` is injected so tests can drive time explicitly; production
    /// callers pass `Instant::now()`.
    pub fn allow(&mut self, now: Instant) -> bool {
        let last = *self.last_update.get_or_insert(now);
        let elapsed = now.saturating_duration_since(last).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
            self.last_update = Some(now);
        }
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Currently available tokens (without refilling).
    pub fn available(&self) -> f64 {
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn burst_then_refill() {
        let mut tb = TokenBucket::new(2.0, 1.0);
        let start = Instant::now();

        assert!(tb.allow(start));
        assert!(tb.allow(start));
        assert!(!tb.allow(start), "third call at t=0 must be limited");

        // 1.5s later: refilled 1.5 tokens, consume 1.
        assert!(tb.allow(start + Duration::from_millis(1500)));
        // 0.5s later: 0.5 + 0.5 refilled = 1.0, consume it.
        assert!(tb.allow(start + Duration::from_millis(2000)));
        assert!(!tb.allow(start + Duration::from_millis(2000)));
    }

    #[test]
    fn refill_caps_at_capacity() {
        let mut tb = TokenBucket::new(10.0, 2.0);
        let start = Instant::now();
        for _ in 0..3 {
            assert!(tb.allow(start));
        }
        // 100 seconds refills far more than capacity; only 10 total fit.
        let later = start + Duration::from_secs(100);
        for _ in 0..10 {
            assert!(tb.allow(later));
        }
        assert!(!tb.allow(later));
    }

    #[test]
    fn slow_refill() {
        let mut tb = TokenBucket::new(1.0, 0.5);
        let start = Instant::now();
        assert!(tb.allow(start));
        assert!(!tb.allow(start));
        // 1s refills only half a token.
        assert!(!tb.allow(start + Duration::from_secs(1)));
        // 2 more seconds completes it.
        assert!(tb.allow(start + Duration::from_secs(3)));
    }
}
