use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding-window event counter (spec §4.10: requests-per-minute,
/// queries-per-hour). Keeps a timestamp per admitted event and counts those
/// still inside the trailing `window`.
#[derive(Debug)]
pub(crate) struct SlidingWindowCounter {
    window: Duration,
    max: u64,
    timestamps: VecDeque<Instant>,
}

impl SlidingWindowCounter {
    pub(crate) fn new(max: u64, window: Duration) -> Self {
        Self {
            window,
            max,
            timestamps: VecDeque::new(),
        }
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.duration_since(oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub(crate) fn try_acquire(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        self.evict_expired(now);

        if (self.timestamps.len() as u64) < self.max {
            self.timestamps.push_back(now);
            return Ok(());
        }

        let oldest = *self.timestamps.front().expect("len == max > 0");
        let retry_after = self
            .window
            .checked_sub(now.duration_since(oldest))
            .unwrap_or(Duration::ZERO);
        Err(retry_after)
    }

    pub(crate) fn count(&mut self) -> u64 {
        self.evict_expired(Instant::now());
        self.timestamps.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_max_then_rejects() {
        let mut window = SlidingWindowCounter::new(3, Duration::from_millis(100));
        assert!(window.try_acquire().is_ok());
        assert!(window.try_acquire().is_ok());
        assert!(window.try_acquire().is_ok());
        assert!(window.try_acquire().is_err());
    }

    #[test]
    fn admits_again_once_events_expire() {
        let mut window = SlidingWindowCounter::new(2, Duration::from_millis(40));
        assert!(window.try_acquire().is_ok());
        assert!(window.try_acquire().is_ok());
        assert!(window.try_acquire().is_err());

        std::thread::sleep(Duration::from_millis(50));
        assert!(window.try_acquire().is_ok());
    }
}
