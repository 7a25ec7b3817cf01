use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Comparison applied by an [`AlertRule`] to its observed metric value,
/// mirroring the original's string conditions (`gt`/`lt`/`eq`/`ne`/`gte`/`lte`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    GreaterThan,
    LessThan,
    Equal,
    NotEqual,
    GreaterOrEqual,
    LessOrEqual,
}

impl Condition {
    fn holds(self, observed: f64, threshold: f64) -> bool {
        match self {
            Condition::GreaterThan => observed > threshold,
            Condition::LessThan => observed < threshold,
            Condition::Equal => (observed - threshold).abs() < f64::EPSILON,
            Condition::NotEqual => (observed - threshold).abs() >= f64::EPSILON,
            Condition::GreaterOrEqual => observed >= threshold,
            Condition::LessOrEqual => observed <= threshold,
        }
    }
}

/// A rule that fires when `metric_name` holds `condition` against
/// `threshold` continuously for `sustained_for` (spec §4.15: "Alert rules
/// evaluate a metric against a condition over a duration").
#[derive(Debug, Clone)]
pub struct AlertRule {
    pub name: String,
    pub metric_name: String,
    pub condition: Condition,
    pub threshold: f64,
    pub sustained_for: Duration,
}

impl AlertRule {
    pub fn new(name: impl Into<String>, metric_name: impl Into<String>, condition: Condition, threshold: f64) -> Self {
        Self {
            name: name.into(),
            metric_name: metric_name.into(),
            condition,
            threshold,
            sustained_for: Duration::ZERO,
        }
    }

    pub fn sustained_for(mut self, duration: Duration) -> Self {
        self.sustained_for = duration;
        self
    }
}

/// A fired or resolved alert instance.
#[derive(Debug, Clone)]
pub struct Alert {
    pub rule_name: String,
    pub metric_name: String,
    pub observed: f64,
    pub threshold: f64,
    pub fired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertTransition {
    Fired,
    Resolved,
}

/// Receives alert transitions. The gateway registers one or more
/// notifiers (a log sink, an in-memory sink for tests, or a webhook).
pub trait Notifier: Send + Sync {
    fn notify(&self, transition: AlertTransition, alert: &Alert);
}

/// Logs alert transitions at `warn`/`info` through `tracing` (spec §4.15).
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, transition: AlertTransition, alert: &Alert) {
        match transition {
            AlertTransition::Fired => tracing::warn!(
                rule = %alert.rule_name,
                metric = %alert.metric_name,
                observed = alert.observed,
                threshold = alert.threshold,
                "alert fired"
            ),
            AlertTransition::Resolved => tracing::info!(
                rule = %alert.rule_name,
                metric = %alert.metric_name,
                "alert resolved"
            ),
        }
    }
}

/// Collects transitions in memory; used by tests and anything that wants
/// to inspect fired alerts without a real sink.
#[derive(Default)]
pub struct InMemoryNotifier {
    transitions: Mutex<Vec<(AlertTransition, Alert)>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transitions(&self) -> Vec<(AlertTransition, Alert)> {
        self.transitions.lock().clone()
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, transition: AlertTransition, alert: &Alert) {
        self.transitions.lock().push((transition, alert.clone()));
    }
}

impl<T: Notifier + ?Sized> Notifier for std::sync::Arc<T> {
    fn notify(&self, transition: AlertTransition, alert: &Alert) {
        (**self).notify(transition, alert);
    }
}

struct ConditionStart {
    since: DateTime<Utc>,
    fired: bool,
}

/// Evaluates registered rules against reported metric samples, tracking
/// how long each rule's condition has held so it only fires once the
/// `sustained_for` window has elapsed, and reports a resolution the next
/// time the condition no longer holds (spec §4.15, grounded on the
/// original's `condition_start_time` bookkeeping in `monitoring/alerts.py`).
pub struct AlertManager {
    rules: Vec<AlertRule>,
    condition_start: Mutex<HashMap<String, ConditionStart>>,
    notifiers: Vec<Box<dyn Notifier>>,
}

impl AlertManager {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self {
            rules,
            condition_start: Mutex::new(HashMap::new()),
            notifiers: Vec::new(),
        }
    }

    pub fn add_notifier(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Reports one metric sample and evaluates all rules keyed on that
    /// metric name. Returns the transitions this sample produced.
    pub fn observe(&self, metric_name: &str, value: f64) -> Vec<AlertTransition> {
        let now = Utc::now();
        let mut transitions = Vec::new();
        let mut starts = self.condition_start.lock();

        for rule in self.rules.iter().filter(|r| r.metric_name == metric_name) {
            let holds = rule.condition.holds(value, rule.threshold);
            let entry = starts.entry(rule.name.clone());

            match (holds, entry) {
                (true, std::collections::hash_map::Entry::Vacant(v)) => {
                    v.insert(ConditionStart { since: now, fired: false });
                }
                (true, std::collections::hash_map::Entry::Occupied(mut o)) => {
                    let elapsed = now.signed_duration_since(o.get().since).to_std().unwrap_or(Duration::ZERO);
                    if !o.get().fired && elapsed >= rule.sustained_for {
                        o.get_mut().fired = true;
                        let alert = Alert {
                            rule_name: rule.name.clone(),
                            metric_name: rule.metric_name.clone(),
                            observed: value,
                            threshold: rule.threshold,
                            fired_at: now,
                        };
                        for notifier in &self.notifiers {
                            notifier.notify(AlertTransition::Fired, &alert);
                        }
                        transitions.push(AlertTransition::Fired);
                    }
                }
                (false, std::collections::hash_map::Entry::Occupied(o)) => {
                    if o.get().fired {
                        let alert = Alert {
                            rule_name: rule.name.clone(),
                            metric_name: rule.metric_name.clone(),
                            observed: value,
                            threshold: rule.threshold,
                            fired_at: now,
                        };
                        for notifier in &self.notifiers {
                            notifier.notify(AlertTransition::Resolved, &alert);
                        }
                        transitions.push(AlertTransition::Resolved);
                    }
                    o.remove();
                }
                (false, std::collections::hash_map::Entry::Vacant(_)) => {}
            }
        }

        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_immediately_when_sustained_for_is_zero() {
        let manager = AlertManager::new(vec![AlertRule::new("high-errors", "error_rate", Condition::GreaterThan, 0.5)]);
        let transitions = manager.observe("error_rate", 0.9);
        assert_eq!(transitions, vec![AlertTransition::Fired]);
    }

    #[test]
    fn does_not_refire_while_still_held() {
        let manager = AlertManager::new(vec![AlertRule::new("high-errors", "error_rate", Condition::GreaterThan, 0.5)]);
        manager.observe("error_rate", 0.9);
        let transitions = manager.observe("error_rate", 0.95);
        assert!(transitions.is_empty());
    }

    #[test]
    fn resolves_once_condition_clears() {
        let manager = AlertManager::new(vec![AlertRule::new("high-errors", "error_rate", Condition::GreaterThan, 0.5)]);
        manager.observe("error_rate", 0.9);
        let transitions = manager.observe("error_rate", 0.1);
        assert_eq!(transitions, vec![AlertTransition::Resolved]);
    }

    #[test]
    fn waits_for_sustained_window_before_firing() {
        let manager = AlertManager::new(vec![AlertRule::new("high-errors", "error_rate", Condition::GreaterThan, 0.5)
            .sustained_for(Duration::from_secs(60))]);
        let transitions = manager.observe("error_rate", 0.9);
        assert!(transitions.is_empty());
    }

    #[test]
    fn notifier_receives_fired_and_resolved_transitions() {
        let mut manager = AlertManager::new(vec![AlertRule::new("high-errors", "error_rate", Condition::GreaterThan, 0.5)]);
        let notifier = std::sync::Arc::new(InMemoryNotifier::new());
        manager.add_notifier(Box::new(notifier.clone()));
        manager.observe("error_rate", 0.9);
        manager.observe("error_rate", 0.1);
        let transitions = notifier.transitions();
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].0, AlertTransition::Fired);
        assert_eq!(transitions[1].0, AlertTransition::Resolved);
    }
}
