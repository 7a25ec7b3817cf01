use std::sync::Arc;
use std::time::Duration;

/// Computes the delay before a given retry attempt (spec §4.13).
///
/// `attempt` is 0-indexed: the delay before the *first* retry (i.e. after
/// the initial call fails) is `next_delay(0)`.
pub trait BackoffSchedule: Send + Sync {
    fn next_delay(&self, attempt: usize) -> Duration;
}

/// Same delay every attempt.
#[derive(Debug, Clone)]
pub struct FixedSchedule {
    delay: Duration,
}

impl FixedSchedule {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffSchedule for FixedSchedule {
    fn next_delay(&self, _attempt: usize) -> Duration {
        self.delay
    }
}

/// Delay grows by a constant increment per attempt: `initial + attempt * step`.
#[derive(Debug, Clone)]
pub struct LinearSchedule {
    initial: Duration,
    step: Duration,
    max_delay: Option<Duration>,
}

impl LinearSchedule {
    pub fn new(initial: Duration, step: Duration) -> Self {
        Self {
            initial,
            step,
            max_delay: None,
        }
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }
}

impl BackoffSchedule for LinearSchedule {
    fn next_delay(&self, attempt: usize) -> Duration {
        let delay = self.initial + self.step.saturating_mul(attempt as u32);
        cap(delay, self.max_delay)
    }
}

/// Delay grows by `multiplier` each attempt, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialSchedule {
    initial: Duration,
    multiplier: f64,
    max_delay: Option<Duration>,
}

impl ExponentialSchedule {
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            multiplier: 2.0,
            max_delay: None,
        }
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }
}

impl BackoffSchedule for ExponentialSchedule {
    fn next_delay(&self, attempt: usize) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let delay = self.initial.mul_f64(factor.max(0.0));
        cap(delay, self.max_delay)
    }
}

/// Delay follows the Fibonacci sequence scaled by `unit`: 1, 1, 2, 3, 5, 8, ...
#[derive(Debug, Clone)]
pub struct FibonacciSchedule {
    unit: Duration,
    max_delay: Option<Duration>,
}

impl FibonacciSchedule {
    pub fn new(unit: Duration) -> Self {
        Self { unit, max_delay: None }
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    fn fib(n: usize) -> u64 {
        let (mut a, mut b) = (1u64, 1u64);
        for _ in 0..n {
            let next = a.saturating_add(b);
            a = b;
            b = next;
        }
        a
    }
}

impl BackoffSchedule for FibonacciSchedule {
    fn next_delay(&self, attempt: usize) -> Duration {
        let delay = self.unit.saturating_mul(Self::fib(attempt) as u32);
        cap(delay, self.max_delay)
    }
}

/// Delay grows as `initial * (attempt + 1) ^ exponent`.
#[derive(Debug, Clone)]
pub struct PolynomialSchedule {
    initial: Duration,
    exponent: f64,
    max_delay: Option<Duration>,
}

impl PolynomialSchedule {
    pub fn new(initial: Duration, exponent: f64) -> Self {
        Self {
            initial,
            exponent,
            max_delay: None,
        }
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }
}

impl BackoffSchedule for PolynomialSchedule {
    fn next_delay(&self, attempt: usize) -> Duration {
        let factor = ((attempt + 1) as f64).powf(self.exponent);
        let delay = self.initial.mul_f64(factor.max(0.0));
        cap(delay, self.max_delay)
    }
}

/// User-supplied delay function, for schedules the built-in shapes don't cover.
pub struct CustomSchedule<F> {
    f: F,
}

impl<F> CustomSchedule<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> BackoffSchedule for CustomSchedule<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn next_delay(&self, attempt: usize) -> Duration {
        (self.f)(attempt)
    }
}

fn cap(delay: Duration, max_delay: Option<Duration>) -> Duration {
    match max_delay {
        Some(max) => delay.min(max),
        None => delay,
    }
}

/// How randomization is applied on top of a schedule's base delay.
///
/// Variants mirror the well-known AWS "Full Jitter" family plus a symmetric
/// mode for callers that want bounded variance rather than a one-sided cut.
#[derive(Debug, Clone, Copy)]
pub enum Jitter {
    /// No randomization; the schedule's delay is used as-is.
    None,
    /// Uniformly random in `[0, base]`.
    Full,
    /// Uniformly random in `[base/2, base]`.
    Equal,
    /// Uniformly random in `[base * (1 - ratio), base * (1 + ratio)]`.
    Symmetric { ratio: f64 },
    /// Decorrelated: `[base, previous * 3]`, clamped to `[base, max]`. Needs
    /// the previous delay, so it's applied by [`JitteredSchedule`] rather
    /// than as a pure function of `base` alone.
    Decorrelated { max: Duration },
}

/// Wraps a [`BackoffSchedule`] with a [`Jitter`] mode.
pub struct JitteredSchedule<S> {
    inner: S,
    jitter: Jitter,
    previous: std::sync::atomic::AtomicU64,
}

impl<S: BackoffSchedule> JitteredSchedule<S> {
    pub fn new(inner: S, jitter: Jitter) -> Self {
        Self {
            inner,
            jitter,
            previous: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn sample(&self, attempt: usize) -> Duration {
        let base = self.inner.next_delay(attempt);
        use rand::Rng;
        let mut rng = rand::rng();
        match self.jitter {
            Jitter::None => base,
            Jitter::Full => {
                let millis = rng.random_range(0..=base.as_millis().max(1) as u64);
                Duration::from_millis(millis)
            }
            Jitter::Equal => {
                let half = base.as_millis() as u64 / 2;
                let full = base.as_millis().max(1) as u64;
                let millis = rng.random_range(half..=full.max(half));
                Duration::from_millis(millis)
            }
            Jitter::Symmetric { ratio } => {
                let ratio = ratio.clamp(0.0, 1.0);
                let secs = base.as_secs_f64();
                let low = (secs * (1.0 - ratio)).max(0.0);
                let high = secs * (1.0 + ratio);
                let sampled = if high > low { rng.random_range(low..=high) } else { secs };
                Duration::from_secs_f64(sampled)
            }
            Jitter::Decorrelated { max } => {
                let previous = self.previous.load(std::sync::atomic::Ordering::Acquire);
                let previous = Duration::from_millis(previous).max(base);
                let upper = previous.saturating_mul(3).min(max).max(base);
                let low = base.as_millis() as u64;
                let high = upper.as_millis().max(low as u128) as u64;
                let millis = if high > low { rng.random_range(low..=high) } else { low };
                let sampled = Duration::from_millis(millis);
                self.previous.store(sampled.as_millis() as u64, std::sync::atomic::Ordering::Release);
                sampled
            }
        }
    }
}

impl<S: BackoffSchedule> BackoffSchedule for JitteredSchedule<S> {
    fn next_delay(&self, attempt: usize) -> Duration {
        self.sample(attempt)
    }
}

/// Type-erased handle to a schedule, for config builders that pick a shape
/// at runtime.
pub type SharedSchedule = Arc<dyn BackoffSchedule>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_never_changes() {
        let s = FixedSchedule::new(Duration::from_millis(50));
        assert_eq!(s.next_delay(0), Duration::from_millis(50));
        assert_eq!(s.next_delay(10), Duration::from_millis(50));
    }

    #[test]
    fn linear_grows_by_step() {
        let s = LinearSchedule::new(Duration::from_millis(100), Duration::from_millis(50));
        assert_eq!(s.next_delay(0), Duration::from_millis(100));
        assert_eq!(s.next_delay(1), Duration::from_millis(150));
        assert_eq!(s.next_delay(2), Duration::from_millis(200));
    }

    #[test]
    fn exponential_doubles_and_caps() {
        let s = ExponentialSchedule::new(Duration::from_millis(100)).max_delay(Duration::from_millis(350));
        assert_eq!(s.next_delay(0), Duration::from_millis(100));
        assert_eq!(s.next_delay(1), Duration::from_millis(200));
        assert_eq!(s.next_delay(2), Duration::from_millis(350));
    }

    #[test]
    fn fibonacci_follows_sequence() {
        let s = FibonacciSchedule::new(Duration::from_millis(10));
        let got: Vec<u64> = (0..6).map(|a| s.next_delay(a).as_millis() as u64).collect();
        assert_eq!(got, vec![10, 10, 20, 30, 50, 80]);
    }

    #[test]
    fn polynomial_grows_by_exponent() {
        let s = PolynomialSchedule::new(Duration::from_millis(10), 2.0);
        assert_eq!(s.next_delay(0), Duration::from_millis(10));
        assert_eq!(s.next_delay(1), Duration::from_millis(40));
        assert_eq!(s.next_delay(2), Duration::from_millis(90));
    }

    #[test]
    fn custom_uses_supplied_closure() {
        let s = CustomSchedule::new(|attempt| Duration::from_millis((attempt as u64 + 1) * 7));
        assert_eq!(s.next_delay(0), Duration::from_millis(7));
        assert_eq!(s.next_delay(2), Duration::from_millis(21));
    }

    #[test]
    fn full_jitter_never_exceeds_base() {
        let js = JitteredSchedule::new(FixedSchedule::new(Duration::from_millis(100)), Jitter::Full);
        for _ in 0..50 {
            assert!(js.next_delay(0) <= Duration::from_millis(100));
        }
    }

    #[test]
    fn equal_jitter_stays_in_upper_half() {
        let js = JitteredSchedule::new(FixedSchedule::new(Duration::from_millis(100)), Jitter::Equal);
        for _ in 0..50 {
            let d = js.next_delay(0);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(100));
        }
    }

    #[test]
    fn symmetric_jitter_stays_within_ratio() {
        let js = JitteredSchedule::new(
            FixedSchedule::new(Duration::from_millis(100)),
            Jitter::Symmetric { ratio: 0.2 },
        );
        for _ in 0..50 {
            let d = js.next_delay(0);
            assert!(d >= Duration::from_millis(80) && d <= Duration::from_millis(120));
        }
    }

    #[test]
    fn decorrelated_jitter_is_monotone_bounded() {
        let js = JitteredSchedule::new(
            FixedSchedule::new(Duration::from_millis(100)),
            Jitter::Decorrelated {
                max: Duration::from_secs(5),
            },
        );
        for attempt in 0..10 {
            let d = js.next_delay(attempt);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_secs(5));
        }
    }
}
