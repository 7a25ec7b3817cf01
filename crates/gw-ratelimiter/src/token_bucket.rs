use std::time::{Duration, Instant};

/// Classic refillable token bucket (spec §4.10: requests-per-second,
/// queries-per-minute). `capacity = limit + burst`, `refill_rate =
/// limit / window`.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub(crate) fn new(limit: u64, window: Duration, burst: u64) -> Self {
        let refill_per_sec = limit as f64 / window.as_secs_f64();
        Self {
            capacity: (limit + burst) as f64,
            refill_per_sec,
            tokens: (limit + burst) as f64,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Attempts to take one token. On failure returns the wait until one
    /// token would be available.
    pub(crate) fn try_acquire(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            let wait_secs = deficit / self.refill_per_sec;
            Err(Duration::from_secs_f64(wait_secs.max(0.0)))
        }
    }

    pub(crate) fn available(&mut self) -> f64 {
        self.refill(Instant::now());
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_burst_then_throttles() {
        let mut bucket = TokenBucket::new(10, Duration::from_secs(1), 5);
        for _ in 0..15 {
            assert!(bucket.try_acquire().is_ok());
        }
        let result = bucket.try_acquire();
        assert!(result.is_err());
    }

    #[test]
    fn refills_over_time() {
        let mut bucket = TokenBucket::new(10, Duration::from_secs(1), 0);
        for _ in 0..10 {
            assert!(bucket.try_acquire().is_ok());
        }
        assert!(bucket.try_acquire().is_err());

        std::thread::sleep(Duration::from_millis(150));
        assert!(bucket.try_acquire().is_ok());
    }
}
