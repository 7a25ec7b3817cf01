use regex::Regex;

use crate::risk::RiskLevel;

/// A named regex with the fixed risk level it contributes when it matches
/// (spec §4.14's pattern matcher).
struct RiskPattern {
    label: &'static str,
    regex: Regex,
    risk: RiskLevel,
}

/// Regex-family layer of the SQL validator. Built and compiled once; reused
/// across calls.
pub struct PatternMatcher {
    patterns: Vec<RiskPattern>,
}

impl PatternMatcher {
    pub fn new() -> Self {
        let mut patterns = Vec::new();
        let mut add = |label: &'static str, pattern: &str, risk: RiskLevel| {
            let regex = Regex::new(&format!("(?i){pattern}")).expect("pattern matcher regex is statically valid");
            patterns.push(RiskPattern { label, regex, risk });
        };

        // critical
        add("union_select", r"union\s+(?:all\s+|distinct\s+)?select", RiskLevel::Critical);
        add("boolean_blind", r"(?:and|or)\s+\d+\s*[=<>]\s*\d+", RiskLevel::Critical);
        add(
            "boolean_blind_quoted",
            r#"(?:and|or)\s+['"]\w+['"]?\s*[=<>]\s*['"]\w+['"]?"#,
            RiskLevel::Critical,
        );
        add("time_blind_waitfor", r"waitfor\s+delay", RiskLevel::Critical);
        add("time_blind_sleep", r"sleep\s*\(", RiskLevel::Critical);
        add("time_blind_pg_sleep", r"pg_sleep\s*\(", RiskLevel::Critical);
        add("time_blind_benchmark", r"benchmark\s*\(", RiskLevel::Critical);
        add(
            "stacked_ddl",
            r";\s*(?:insert|update|delete|drop|create|alter|grant|revoke)",
            RiskLevel::Critical,
        );
        add("information_schema", r"information_schema\.", RiskLevel::Critical);
        add("sys_schema", r"\bsys\.", RiskLevel::Critical);
        add("mysql_schema", r"\bmysql\.", RiskLevel::Critical);
        add("xp_cmdshell", r"xp_cmdshell", RiskLevel::Critical);
        add("sp_execute", r"sp_execute", RiskLevel::Critical);
        add("exec_call", r"exec(?:ute)?\s*\(", RiskLevel::Critical);
        add("load_file", r"load_file\s*\(", RiskLevel::Critical);
        add("into_outfile", r"into\s+outfile", RiskLevel::Critical);
        add("into_dumpfile", r"into\s+dumpfile", RiskLevel::Critical);

        // high
        add("sql_comment", r"(?:--|#|/\*)", RiskLevel::High);
        add("hex_literal", r"0x[0-9a-f]+", RiskLevel::High);
        add("char_encoding", r"(?:char|chr|ascii)\s*\(", RiskLevel::High);
        add("concat", r"(?:group_)?concat\s*\(", RiskLevel::High);
        add("version_fingerprint", r"@@(?:version|global)", RiskLevel::High);
        add("fingerprint_fn", r"(?:version|user|database|schema)\s*\(", RiskLevel::High);

        // medium
        add("nested_singles", r"'[^']*'[^']*'", RiskLevel::Medium);
        add("boolean_chain", r"(?:and|or)\s+[\w\s]*(?:=|<>|!=|like)", RiskLevel::Medium);
        add("subquery", r"\(\s*select\s+", RiskLevel::Medium);
        add("case_when", r"case\s+when", RiskLevel::Medium);
        add("cast_convert", r"(?:cast|convert)\s*\(", RiskLevel::Medium);

        // low
        add("repeated_operators", r"[=<>!]{2,}", RiskLevel::Low);
        add("excessive_whitespace", r"\s{5,}", RiskLevel::Low);
        add("excessive_wildcards", r"[%_*]{3,}", RiskLevel::Low);

        Self { patterns }
    }

    /// Returns the maximum risk observed and a violation string per match.
    /// Once a higher tier matches, lower tiers are skipped — mirroring the
    /// original's "only the highest tier's violations are reported".
    pub fn analyze(&self, query: &str) -> (RiskLevel, Vec<String>) {
        let mut max_risk = RiskLevel::None;
        let mut violations = Vec::new();

        for tier in [RiskLevel::Critical, RiskLevel::High, RiskLevel::Medium, RiskLevel::Low] {
            for pattern in self.patterns.iter().filter(|p| p.risk == tier) {
                if pattern.regex.is_match(query) {
                    violations.push(format!("{tier:?} pattern matched: {}", pattern.label));
                    max_risk = max_risk.max(tier);
                }
            }
            if max_risk != RiskLevel::None {
                break;
            }
        }

        (max_risk, violations)
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_select_is_critical() {
        let matcher = PatternMatcher::new();
        let (risk, violations) = matcher.analyze("SELECT * FROM t WHERE id = 1 UNION SELECT password FROM users");
        assert_eq!(risk, RiskLevel::Critical);
        assert!(violations.iter().any(|v| v.contains("union_select")));
    }

    #[test]
    fn sql_comment_is_high() {
        let matcher = PatternMatcher::new();
        let (risk, _) = matcher.analyze("SELECT * FROM t -- drop everything");
        assert_eq!(risk, RiskLevel::High);
    }

    #[test]
    fn plain_select_is_clean() {
        let matcher = PatternMatcher::new();
        let (risk, violations) = matcher.analyze("SELECT id, name FROM customers WHERE region = 'west'");
        assert_eq!(risk, RiskLevel::None);
        assert!(violations.is_empty());
    }
}
