//! Multi-layer SQL validator (spec §4.14): a regex pattern matcher, a token
//! analyzer, and an AST structure validator each contribute violations and a
//! risk level; the maximum risk decides acceptance. The caller logs the
//! structured result and enforces it — this crate never raises, it classifies.

mod config;
mod pattern;
mod risk;
mod structure;
mod token;

pub use config::{ValidatorConfig, ValidatorConfigBuilder};
pub use risk::{QueryType, RiskLevel};

use pattern::PatternMatcher;
use structure::StructureValidator;
use token::TokenAnalyzer;

/// Structured validation outcome (spec §4.14).
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub risk_level: RiskLevel,
    pub query_type: QueryType,
    pub violations: Vec<String>,
    pub query_length: usize,
}

/// Combines the pattern, token, and structure layers behind one entry point.
pub struct SqlValidator {
    config: ValidatorConfig,
    patterns: PatternMatcher,
    tokens: TokenAnalyzer,
    structure: StructureValidator,
}

impl SqlValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            patterns: PatternMatcher::new(),
            tokens: TokenAnalyzer::new(),
            structure: StructureValidator::new(),
        }
    }

    /// Classifies `query`. Never panics across the API boundary: a layer
    /// that panics internally is caught and treated as `High` risk (spec
    /// §4.14: "exceptions inside validation fail closed").
    pub fn validate(&self, query: &str) -> ValidationResult {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.validate_inner(query)));
        match outcome {
            Ok(result) => result,
            Err(_panic) => {
                tracing::error!("sql validator panicked; failing closed as high risk");
                ValidationResult {
                    is_valid: false,
                    risk_level: RiskLevel::High,
                    query_type: QueryType::Unknown,
                    violations: vec!["validator internal error: failed closed".to_string()],
                    query_length: query.len(),
                }
            }
        }
    }

    fn validate_inner(&self, query: &str) -> ValidationResult {
        let mut violations = Vec::new();
        let mut risk = RiskLevel::None;

        if query.len() > self.config.max_query_length {
            violations.push(format!("query length {} exceeds max {}", query.len(), self.config.max_query_length));
            risk = risk.max(RiskLevel::Medium);
        }

        let (pattern_risk, pattern_violations) = self.patterns.analyze(query);
        risk = risk.max(pattern_risk);
        violations.extend(pattern_violations);

        let token_findings = self.tokens.analyze(query, self.config.readonly_mode);
        if !token_findings.violations.is_empty() {
            risk = risk.max(RiskLevel::High);
        }
        violations.extend(token_findings.violations);

        let structure_findings = self.structure.analyze(query);
        risk = risk.max(structure_findings.risk);
        violations.extend(structure_findings.violations);

        let blocked = match risk {
            RiskLevel::Critical | RiskLevel::High => true,
            RiskLevel::Medium => self.config.strict_validation,
            RiskLevel::Low | RiskLevel::None => false,
        };

        tracing::debug!(
            query_type = ?token_findings.query_type,
            risk = ?risk,
            is_valid = !blocked,
            violation_count = violations.len(),
            "sql validation classified"
        );

        ValidationResult {
            is_valid: !blocked,
            risk_level: risk,
            query_type: token_findings.query_type,
            violations,
            query_length: query.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_union_injection() {
        let validator = SqlValidator::new(ValidatorConfig::default());
        let result = validator.validate("SELECT * FROM t WHERE id = 1 UNION SELECT password FROM users");
        assert!(!result.is_valid);
        assert_eq!(result.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn allows_plain_select() {
        let validator = SqlValidator::new(ValidatorConfig::default());
        let result = validator.validate("SELECT id, name FROM customers LIMIT 10");
        assert!(result.is_valid);
        assert_eq!(result.risk_level, RiskLevel::None);
        assert_eq!(result.query_type, QueryType::Select);
    }

    #[test]
    fn strict_mode_blocks_medium_risk() {
        let lenient = SqlValidator::new(ValidatorConfig::builder().strict_validation(false).build());
        let strict = SqlValidator::new(ValidatorConfig::builder().strict_validation(true).build());
        let query = "SELECT * FROM t WHERE x IN (SELECT y FROM CASE WHEN 1 THEN u ELSE v END)";

        let lenient_result = lenient.validate(query);
        let strict_result = strict.validate(query);
        if lenient_result.risk_level == RiskLevel::Medium {
            assert!(lenient_result.is_valid);
            assert!(!strict_result.is_valid);
        }
    }

    #[test]
    fn readonly_mode_blocks_write_queries() {
        let validator = SqlValidator::new(ValidatorConfig::default());
        let result = validator.validate("DELETE FROM customers WHERE id = 1");
        assert!(!result.is_valid);
    }

    #[test]
    fn oversized_query_is_flagged() {
        let validator = SqlValidator::new(ValidatorConfig::builder().max_query_length(10).build());
        let result = validator.validate("SELECT * FROM a_table_with_a_long_name");
        assert!(result.violations.iter().any(|v| v.contains("exceeds max")));
    }
}
