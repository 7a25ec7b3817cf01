use std::sync::atomic::{AtomicI64, Ordering};

/// Integer gauge with semaphore-style acquire/release, used for the
/// concurrent-requests dimension (spec §4.10). Never goes negative
/// (spec §3 invariants).
#[derive(Debug)]
pub(crate) struct ConcurrentGauge {
    max: i64,
    current: AtomicI64,
}

impl ConcurrentGauge {
    pub(crate) fn new(max: u32) -> Self {
        Self {
            max: max as i64,
            current: AtomicI64::new(0),
        }
    }

    pub(crate) fn try_acquire(&self) -> bool {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return false;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    pub(crate) fn release(&self) {
        let previous = self.current.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
            Some((v - 1).max(0))
        });
        debug_assert!(previous.is_ok());
    }

    pub(crate) fn current(&self) -> i64 {
        self.current.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_at_max_and_never_goes_negative() {
        let gauge = ConcurrentGauge::new(2);
        assert!(gauge.try_acquire());
        assert!(gauge.try_acquire());
        assert!(!gauge.try_acquire());

        gauge.release();
        assert!(gauge.try_acquire());

        gauge.release();
        gauge.release();
        gauge.release();
        assert_eq!(gauge.current(), 0);
    }
}
