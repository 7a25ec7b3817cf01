use sqlparser::ast::{Expr, Query, SetExpr, Statement, TableFactor};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::risk::RiskLevel;

const FORBIDDEN_FUNCTIONS: &[&str] = &[
    "xp_cmdshell",
    "sp_execute",
    "load_file",
    "current_user",
    "version",
    "user",
    "database",
    "system_user",
    "session_user",
];

const MAX_SUBQUERY_DEPTH: u32 = 5;
const MAX_COMPLEXITY_SCORE: u32 = 40;

/// Outcome of parsing a statement to an AST and walking it (spec §4.14's
/// structure validator).
#[derive(Debug, Default)]
pub struct StructureFindings {
    pub risk: RiskLevel,
    pub violations: Vec<String>,
    pub parsed: bool,
}

#[derive(Default)]
struct WalkState {
    max_depth: u32,
    join_count: u32,
    function_names: Vec<String>,
    has_where: bool,
}

/// AST-level validator. Parse failures do not themselves raise risk — the
/// warehouse is the final arbiter of syntax — but are logged and leave
/// `parsed = false` so callers can factor that into their own confidence.
pub struct StructureValidator;

impl StructureValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, query: &str) -> StructureFindings {
        let dialect = GenericDialect {};
        let statements = match Parser::parse_sql(&dialect, query) {
            Ok(statements) => statements,
            Err(err) => {
                tracing::debug!(error = %err, "structure validator: parse failed, query not AST-checked");
                return StructureFindings {
                    risk: RiskLevel::None,
                    violations: Vec::new(),
                    parsed: false,
                };
            }
        };

        let mut state = WalkState::default();
        for statement in &statements {
            if let Statement::Query(boxed_query) = statement {
                walk_query(boxed_query, 0, &mut state);
            }
        }

        let mut violations = Vec::new();
        let mut risk = RiskLevel::None;

        for name in &state.function_names {
            if FORBIDDEN_FUNCTIONS.contains(&name.to_ascii_lowercase().as_str()) {
                violations.push(format!("forbidden function call: {name}"));
                risk = risk.max(RiskLevel::Critical);
            }
        }

        if state.max_depth > MAX_SUBQUERY_DEPTH {
            violations.push(format!("subquery nesting depth {} exceeds {MAX_SUBQUERY_DEPTH}", state.max_depth));
            risk = risk.max(RiskLevel::High);
        }

        // Textual signal for group-by presence: the GroupByExpr AST shape
        // has shifted across sqlparser releases, but its lexical footprint
        // has not, so this stays stable across crate upgrades.
        let has_group_by = query.to_ascii_lowercase().contains("group by");
        let complexity = state.join_count * 3
            + state.function_names.len() as u32 * 2
            + u32::from(state.has_where)
            + u32::from(has_group_by) * 2;
        if complexity > MAX_COMPLEXITY_SCORE {
            violations.push(format!("query complexity score {complexity} exceeds {MAX_COMPLEXITY_SCORE}"));
            risk = risk.max(RiskLevel::Medium);
        }

        StructureFindings { risk, violations, parsed: true }
    }
}

impl Default for StructureValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn walk_query(query: &Query, depth: u32, state: &mut WalkState) {
    state.max_depth = state.max_depth.max(depth);
    walk_set_expr(&query.body, depth, state);
}

fn walk_set_expr(body: &SetExpr, depth: u32, state: &mut WalkState) {
    match body {
        SetExpr::Select(select) => {
            for item in &select.projection {
                if let sqlparser::ast::SelectItem::UnnamedExpr(expr) | sqlparser::ast::SelectItem::ExprWithAlias { expr, .. } = item {
                    walk_expr(expr, depth, state);
                }
            }
            for twj in &select.from {
                walk_table_factor(&twj.relation, depth, state);
                state.join_count += twj.joins.len() as u32;
                for join in &twj.joins {
                    walk_table_factor(&join.relation, depth, state);
                }
            }
            if let Some(selection) = &select.selection {
                state.has_where = true;
                walk_expr(selection, depth, state);
            }
            if let Some(having) = &select.having {
                walk_expr(having, depth, state);
            }
        }
        SetExpr::SetOperation { left, right, .. } => {
            walk_set_expr(left, depth, state);
            walk_set_expr(right, depth, state);
        }
        SetExpr::Query(inner) => walk_query(inner, depth, state),
        _ => {}
    }
}

fn walk_table_factor(factor: &TableFactor, depth: u32, state: &mut WalkState) {
    if let TableFactor::Derived { subquery, .. } = factor {
        walk_query(subquery, depth + 1, state);
    }
}

fn walk_expr(expr: &Expr, depth: u32, state: &mut WalkState) {
    match expr {
        Expr::Function(function) => {
            state.function_names.push(function.name.to_string());
        }
        Expr::Subquery(query) => walk_query(query, depth + 1, state),
        Expr::InSubquery { subquery, expr, .. } => {
            walk_expr(expr, depth, state);
            walk_query(subquery, depth + 1, state);
        }
        Expr::Exists { subquery, .. } => walk_query(subquery, depth + 1, state),
        Expr::BinaryOp { left, right, .. } => {
            walk_expr(left, depth, state);
            walk_expr(right, depth, state);
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::Cast { expr, .. } => {
            walk_expr(expr, depth, state);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_function_is_critical() {
        let validator = StructureValidator::new();
        let findings = validator.analyze("SELECT current_user()");
        assert_eq!(findings.risk, RiskLevel::Critical);
        assert!(findings.violations.iter().any(|v| v.contains("current_user")));
    }

    #[test]
    fn deeply_nested_subqueries_flagged() {
        let validator = StructureValidator::new();
        let query = "SELECT * FROM (SELECT * FROM (SELECT * FROM (SELECT * FROM (SELECT * FROM (SELECT * FROM t) a) b) c) d) e";
        let findings = validator.analyze(query);
        assert!(findings.violations.iter().any(|v| v.contains("nesting depth")));
    }

    #[test]
    fn plain_select_has_no_findings() {
        let validator = StructureValidator::new();
        let findings = validator.analyze("SELECT id FROM customers WHERE region = 'west'");
        assert_eq!(findings.risk, RiskLevel::None);
        assert!(findings.parsed);
    }

    #[test]
    fn unparsable_query_does_not_raise_risk() {
        let validator = StructureValidator::new();
        let findings = validator.analyze("this is not sql at all ###");
        assert!(!findings.parsed);
        assert_eq!(findings.risk, RiskLevel::None);
    }
}
