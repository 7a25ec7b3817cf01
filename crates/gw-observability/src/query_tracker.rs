use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;

const MAX_SLOW_QUERIES: usize = 200;

/// Per-pattern aggregate statistics (spec §4.15: "keeps per-pattern count /
/// durations / failure rate plus a bounded slow-queries window").
#[derive(Debug, Clone)]
pub struct QueryPatternStats {
    pub pattern_id: String,
    pub normalized_query: String,
    pub execution_count: u64,
    pub failure_count: u64,
    pub total_duration: Duration,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub last_seen: DateTime<Utc>,
}

impl QueryPatternStats {
    fn new(pattern_id: String, normalized_query: String, now: DateTime<Utc>) -> Self {
        Self {
            pattern_id,
            normalized_query,
            execution_count: 0,
            failure_count: 0,
            total_duration: Duration::ZERO,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
            last_seen: now,
        }
    }

    pub fn avg_duration(&self) -> Duration {
        if self.execution_count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.execution_count as u32
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.execution_count == 0 {
            0.0
        } else {
            self.failure_count as f64 / self.execution_count as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlowQueryRecord {
    pub pattern_id: String,
    pub client_id: String,
    pub duration: Duration,
    pub at: DateTime<Utc>,
}

struct Inner {
    patterns: HashMap<String, QueryPatternStats>,
    slow_queries: VecDeque<SlowQueryRecord>,
    slow_query_threshold: Duration,
}

/// Tracks executed query shapes by a normalized-and-hashed pattern id, so
/// recurring query shapes can be aggregated without retaining literal
/// parameter values (spec §4.15's query tracker).
pub struct QueryTracker {
    inner: Mutex<Inner>,
    literal_re: Regex,
    number_re: Regex,
    in_list_re: Regex,
    whitespace_re: Regex,
}

impl QueryTracker {
    pub fn new(slow_query_threshold: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                patterns: HashMap::new(),
                slow_queries: VecDeque::new(),
                slow_query_threshold,
            }),
            literal_re: Regex::new(r"'[^']*'").expect("static regex"),
            number_re: Regex::new(r"\b\d+\b").expect("static regex"),
            in_list_re: Regex::new(r"(?i)IN\s*\([^)]+\)").expect("static regex"),
            whitespace_re: Regex::new(r"\s+").expect("static regex"),
        }
    }

    /// Strips literal values and collapses whitespace, matching the
    /// original's `normalize_query`: upper-case, single-quoted strings
    /// replaced with `'?'`, bare numbers with `?`, `IN (...)` lists with
    /// `IN (?)`.
    pub fn normalize_query(&self, query: &str) -> String {
        let upper = query.to_uppercase();
        let collapsed = self.whitespace_re.replace_all(upper.trim(), " ");
        let no_strings = self.literal_re.replace_all(&collapsed, "'?'");
        let no_numbers = self.number_re.replace_all(&no_strings, "?");
        self.in_list_re.replace_all(&no_numbers, "IN (?)").into_owned()
    }

    pub fn pattern_id(&self, normalized_query: &str) -> String {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        normalized_query.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// Records one completed query execution against its pattern.
    pub fn record(&self, client_id: &str, query: &str, duration: Duration, succeeded: bool) -> String {
        let normalized = self.normalize_query(query);
        let pattern_id = self.pattern_id(&normalized);
        let now = Utc::now();

        let mut inner = self.inner.lock();
        let entry = inner
            .patterns
            .entry(pattern_id.clone())
            .or_insert_with(|| QueryPatternStats::new(pattern_id.clone(), normalized, now));
        entry.execution_count += 1;
        entry.total_duration += duration;
        entry.min_duration = entry.min_duration.min(duration);
        entry.max_duration = entry.max_duration.max(duration);
        entry.last_seen = now;
        if !succeeded {
            entry.failure_count += 1;
        }

        if duration >= inner.slow_query_threshold {
            inner.slow_queries.push_back(SlowQueryRecord {
                pattern_id: pattern_id.clone(),
                client_id: client_id.to_string(),
                duration,
                at: now,
            });
            while inner.slow_queries.len() > MAX_SLOW_QUERIES {
                inner.slow_queries.pop_front();
            }
        }

        pattern_id
    }

    pub fn pattern(&self, pattern_id: &str) -> Option<QueryPatternStats> {
        self.inner.lock().patterns.get(pattern_id).cloned()
    }

    pub fn slow_queries(&self) -> Vec<SlowQueryRecord> {
        self.inner.lock().slow_queries.iter().cloned().collect()
    }

    pub fn pattern_count(&self) -> usize {
        self.inner.lock().patterns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_literals_and_numbers() {
        let tracker = QueryTracker::new(Duration::from_secs(1));
        let normalized = tracker.normalize_query("select * from t where id = 42 and name = 'bob'");
        assert_eq!(normalized, "SELECT * FROM T WHERE ID = ? AND NAME = '?'");
    }

    #[test]
    fn same_shape_queries_share_a_pattern_id() {
        let tracker = QueryTracker::new(Duration::from_secs(1));
        let a = tracker.record("client-a", "SELECT * FROM t WHERE id = 1", Duration::from_millis(5), true);
        let b = tracker.record("client-a", "SELECT * FROM t WHERE id = 2", Duration::from_millis(5), true);
        assert_eq!(a, b);
        assert_eq!(tracker.pattern(&a).unwrap().execution_count, 2);
    }

    #[test]
    fn slow_queries_are_recorded_and_bounded() {
        let tracker = QueryTracker::new(Duration::from_millis(10));
        tracker.record("client-a", "SELECT 1", Duration::from_millis(50), true);
        tracker.record("client-a", "SELECT 2", Duration::from_millis(1), true);
        assert_eq!(tracker.slow_queries().len(), 1);
    }

    #[test]
    fn failure_rate_reflects_failed_executions() {
        let tracker = QueryTracker::new(Duration::from_secs(1));
        let id = tracker.record("client-a", "SELECT 1", Duration::from_millis(1), true);
        tracker.record("client-a", "SELECT 1", Duration::from_millis(1), false);
        let stats = tracker.pattern(&id).unwrap();
        assert_eq!(stats.failure_rate(), 0.5);
    }
}
