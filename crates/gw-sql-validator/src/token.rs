use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};

use crate::risk::QueryType;

const MAX_COMMENT_TOKENS: usize = 2;

/// Findings from the token layer (spec §4.14's token analyzer).
#[derive(Debug, Default)]
pub struct TokenFindings {
    pub query_type: QueryType,
    pub violations: Vec<String>,
}

/// Tokenizes with `sqlparser`'s generic-SQL tokenizer to classify the
/// statement's verb and flag suspicious token-level shapes, independent of
/// whether the query parses to a full AST.
pub struct TokenAnalyzer;

impl TokenAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, query: &str, readonly_mode: bool) -> TokenFindings {
        let dialect = GenericDialect {};
        let tokens = match Tokenizer::new(&dialect, query).tokenize() {
            Ok(tokens) => tokens,
            Err(err) => {
                tracing::debug!(error = %err, "token analyzer: tokenize failed");
                return TokenFindings {
                    query_type: QueryType::Unknown,
                    violations: vec!["query failed to tokenize".to_string()],
                };
            }
        };

        if tokens.is_empty() {
            return TokenFindings {
                query_type: QueryType::Unknown,
                violations: vec!["empty query".to_string()],
            };
        }

        let query_type = first_meaningful_verb(&tokens);
        let mut violations = Vec::new();

        if readonly_mode && !query_type.is_read_only() {
            violations.push(format!("{query_type:?} is not permitted in read-only mode"));
        }

        let comment_count = tokens
            .iter()
            .filter(|t| matches!(t, Token::Whitespace(Whitespace::SingleLineComment { .. } | Whitespace::MultiLineComment(_))))
            .count();
        if comment_count > MAX_COMMENT_TOKENS {
            violations.push(format!("excessive comment tokens: {comment_count}"));
        }

        for token in &tokens {
            if let Token::SingleQuotedString(literal) = token {
                inspect_literal(literal, &mut violations);
            }
        }

        TokenFindings { query_type, violations }
    }
}

impl Default for TokenAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn first_meaningful_verb(tokens: &[Token]) -> QueryType {
    for token in tokens {
        let Token::Word(word) = token else { continue };
        return match word.keyword {
            Keyword::SELECT => QueryType::Select,
            Keyword::SHOW => QueryType::Show,
            Keyword::DESCRIBE | Keyword::DESC => QueryType::Describe,
            Keyword::EXPLAIN => QueryType::Explain,
            Keyword::WITH => QueryType::With,
            Keyword::INSERT => QueryType::Insert,
            Keyword::UPDATE => QueryType::Update,
            Keyword::DELETE => QueryType::Delete,
            Keyword::CREATE => QueryType::Create,
            Keyword::DROP => QueryType::Drop,
            Keyword::ALTER => QueryType::Alter,
            Keyword::TRUNCATE => QueryType::Truncate,
            Keyword::GRANT => QueryType::Grant,
            Keyword::REVOKE => QueryType::Revoke,
            Keyword::EXECUTE | Keyword::EXEC => QueryType::Execute,
            Keyword::CALL => QueryType::Call,
            _ => QueryType::Unknown,
        };
    }
    QueryType::Unknown
}

/// Flags string literals that smuggle SQL keywords, control bytes, or
/// percent/hex-encoded payloads (spec §4.14).
fn inspect_literal(literal: &str, violations: &mut Vec<String>) {
    let lowered = literal.to_ascii_lowercase();
    for keyword in ["select", "union", "drop", "insert", "delete", "--", "/*"] {
        if lowered.contains(keyword) {
            violations.push(format!("string literal contains embedded keyword: {keyword}"));
        }
    }
    if literal.chars().any(|c| c.is_control()) {
        violations.push("string literal contains control bytes".to_string());
    }
    if literal.contains('%') && literal.to_ascii_lowercase().contains("0x") {
        violations.push("string literal looks percent/hex-encoded".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_select() {
        let analyzer = TokenAnalyzer::new();
        let findings = analyzer.analyze("SELECT * FROM t", true);
        assert_eq!(findings.query_type, QueryType::Select);
        assert!(findings.violations.is_empty());
    }

    #[test]
    fn write_verb_rejected_in_readonly_mode() {
        let analyzer = TokenAnalyzer::new();
        let findings = analyzer.analyze("DELETE FROM t WHERE id = 1", true);
        assert_eq!(findings.query_type, QueryType::Delete);
        assert!(!findings.violations.is_empty());
    }

    #[test]
    fn write_verb_allowed_outside_readonly_mode() {
        let analyzer = TokenAnalyzer::new();
        let findings = analyzer.analyze("DELETE FROM t WHERE id = 1", false);
        assert!(findings.violations.is_empty());
    }

    #[test]
    fn embedded_keyword_in_literal_is_flagged() {
        let analyzer = TokenAnalyzer::new();
        let findings = analyzer.analyze("SELECT * FROM t WHERE name = 'x UNION SELECT 1'", true);
        assert!(findings.violations.iter().any(|v| v.contains("embedded keyword")));
    }
}
