use parking_lot::Mutex;
use std::time::Duration;

use crate::concurrent::ConcurrentGauge;
use crate::config::{RateLimitRules, ONE_HOUR, ONE_MINUTE, ONE_SECOND};
use crate::error::{RateLimitError, RateLimitKind, RateLimitScope};
use crate::sliding_window::SlidingWindowCounter;
use crate::token_bucket::TokenBucket;

/// All the limiting mechanisms for one scope: either a single client or the
/// global aggregate (spec §4.10's dimension table).
pub(crate) struct ScopeLimiter {
    requests_per_second: Mutex<TokenBucket>,
    requests_per_minute: Mutex<SlidingWindowCounter>,
    queries_per_minute: Mutex<TokenBucket>,
    queries_per_hour: Mutex<SlidingWindowCounter>,
    concurrent: ConcurrentGauge,
    rules: RateLimitRules,
}

impl ScopeLimiter {
    pub(crate) fn new(rules: RateLimitRules) -> Self {
        Self {
            requests_per_second: Mutex::new(TokenBucket::new(
                rules.requests_per_second,
                ONE_SECOND,
                rules.requests_per_second_burst,
            )),
            requests_per_minute: Mutex::new(SlidingWindowCounter::new(rules.requests_per_minute, ONE_MINUTE)),
            queries_per_minute: Mutex::new(TokenBucket::new(
                rules.queries_per_minute,
                ONE_MINUTE,
                rules.queries_per_minute_burst,
            )),
            queries_per_hour: Mutex::new(SlidingWindowCounter::new(rules.queries_per_hour, ONE_HOUR)),
            concurrent: ConcurrentGauge::new(rules.max_concurrent_requests),
            rules,
        }
    }

    /// Checks the request-admission dimensions (not queries-per-*, which are
    /// consumed separately per executed query via [`Self::check_query`]).
    pub(crate) fn check_request(&self, scope: RateLimitScope) -> Result<(), RateLimitError> {
        if let Err(retry_after) = self.requests_per_second.lock().try_acquire() {
            return Err(RateLimitError {
                kind: RateLimitKind::RequestsPerSecond,
                current: self.rules.requests_per_second,
                limit: self.rules.requests_per_second,
                retry_after,
                scope,
            });
        }
        if let Err(retry_after) = self.requests_per_minute.lock().try_acquire() {
            return Err(RateLimitError {
                kind: RateLimitKind::RequestsPerMinute,
                current: self.rules.requests_per_minute,
                limit: self.rules.requests_per_minute,
                retry_after,
                scope,
            });
        }
        Ok(())
    }

    pub(crate) fn check_query(&self, scope: RateLimitScope) -> Result<(), RateLimitError> {
        if let Err(retry_after) = self.queries_per_minute.lock().try_acquire() {
            return Err(RateLimitError {
                kind: RateLimitKind::QueriesPerMinute,
                current: self.rules.queries_per_minute,
                limit: self.rules.queries_per_minute,
                retry_after,
                scope,
            });
        }
        if let Err(retry_after) = self.queries_per_hour.lock().try_acquire() {
            return Err(RateLimitError {
                kind: RateLimitKind::QueriesPerHour,
                current: self.rules.queries_per_hour,
                limit: self.rules.queries_per_hour,
                retry_after,
                scope,
            });
        }
        Ok(())
    }

    pub(crate) fn acquire_request_slot(&self, scope: RateLimitScope) -> Result<(), RateLimitError> {
        if self.concurrent.try_acquire() {
            Ok(())
        } else {
            Err(RateLimitError {
                kind: RateLimitKind::ConcurrentRequests,
                current: self.concurrent.current() as u64,
                limit: self.rules.max_concurrent_requests as u64,
                retry_after: Duration::from_millis(100),
                scope,
            })
        }
    }

    pub(crate) fn release_request_slot(&self) {
        self.concurrent.release();
    }

    pub(crate) fn concurrent_count(&self) -> i64 {
        self.concurrent.current()
    }
}
