use regex::Regex;
use sqlparser::ast::{SetExpr, Statement};
use std::sync::OnceLock;

use super::{Candidate, SqlCheck};
use crate::sql_refs::parse_statements;

/// Keywords that may never appear in code position of a generated statement.
pub const MUTATING_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "CREATE", "ALTER", "TRUNCATE",
];

static MUTATING_RE: OnceLock<Regex> = OnceLock::new();

fn mutating_re() -> &'static Regex {
    MUTATING_RE.get_or_init(|| {
        let alternation = MUTATING_KEYWORDS.join("|");
        Regex::new(&format!(r"\b({alternation})\b")).expect("static regex")
    })
}

/// First word of the statement must be SELECT.
pub struct SelectFirst;

impl SqlCheck for SelectFirst {
    fn check(&self, candidate: &Candidate<'_>) -> Result<(), String> {
        let text = candidate.upper.trim_start();
        if text.is_empty() {
            return Err("Empty SQL statement".to_string());
        }
        let first: String = text
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if first == "SELECT" {
            Ok(())
        } else if first.is_empty() {
            Err("Only SELECT statements are allowed".to_string())
        } else {
            Err(format!(
                "Only SELECT statements are allowed (statement starts with {first})"
            ))
        }
    }
}

/// No mutating keyword anywhere in code, a single statement, and (when the
/// parser understands it) a plain query without `SELECT … INTO`.
pub struct NoMutation;

impl SqlCheck for NoMutation {
    fn check(&self, candidate: &Candidate<'_>) -> Result<(), String> {
        if let Some(m) = mutating_re().find(&candidate.upper) {
            return Err(format!("Disallowed keyword {} in generated SQL", m.as_str()));
        }

        let body = candidate.stripped.trim().trim_end_matches(';');
        if body.contains(';') {
            return Err("Multiple statements are not allowed".to_string());
        }

        // Parser refinement. Postgres syntax the parser does not know is left
        // to the read-only session.
        match parse_statements(candidate.original) {
            Ok(statements) => {
                if statements.len() != 1 {
                    return Err("Multiple statements are not allowed".to_string());
                }
                let Statement::Query(query) = &statements[0] else {
                    return Err("Only read-only queries are allowed".to_string());
                };
                if let SetExpr::Select(select) = query.body.as_ref()
                    && select.into.is_some()
                {
                    return Err("SELECT INTO is not allowed".to_string());
                }
                Ok(())
            }
            Err(e) => {
                tracing::debug!(error = %e, "SQL parser could not parse candidate; relying on textual checks");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select_first(sql: &str) -> Result<(), String> {
        SelectFirst.check(&Candidate::new(sql))
    }

    fn no_mutation(sql: &str) -> Result<(), String> {
        NoMutation.check(&Candidate::new(sql))
    }

    #[test]
    fn select_is_allowed() {
        assert!(select_first("SELECT 1").is_ok());
        assert!(select_first("select 1").is_ok());
        assert!(select_first("/* c */ SELECT 1").is_ok());
    }

    #[test]
    fn with_clause_is_blocked() {
        assert!(select_first("WITH x AS (SELECT 1) SELECT * FROM x").is_err());
    }

    #[test]
    fn selectx_is_not_select() {
        assert!(select_first("SELECTX 1").is_err());
    }

    #[test]
    fn empty_is_blocked() {
        assert_eq!(select_first("  -- nothing\n").unwrap_err(), "Empty SQL statement");
    }

    #[test]
    fn every_mutating_keyword_is_blocked() {
        for kw in MUTATING_KEYWORDS {
            let sql = format!("SELECT 1 FROM t WHERE x IN ({kw} y) LIMIT 1");
            let err = no_mutation(&sql).unwrap_err();
            assert!(err.contains(kw), "{kw}: {err}");
        }
    }

    #[test]
    fn identifiers_containing_keywords_are_fine() {
        assert!(no_mutation("SELECT created_at, updated_at, is_deleted FROM t LIMIT 1").is_ok());
    }

    #[test]
    fn hidden_in_comment_is_fine() {
        assert!(no_mutation("SELECT 1 /* DROP TABLE t */ LIMIT 1").is_ok());
    }

    #[test]
    fn trailing_semicolon_is_fine() {
        assert!(no_mutation("SELECT 1 LIMIT 1;").is_ok());
    }

    #[test]
    fn batch_is_blocked() {
        assert!(no_mutation("SELECT 1 LIMIT 1; SELECT 2 LIMIT 1").is_err());
    }

    #[test]
    fn select_into_is_blocked() {
        let err = no_mutation("SELECT * INTO copy_table FROM santri_pribadi LIMIT 1").unwrap_err();
        assert!(err.contains("INTO"));
    }

    #[test]
    fn set_statement_is_blocked() {
        assert!(no_mutation("SET search_path = public").is_err());
    }
}
