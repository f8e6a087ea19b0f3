use std::collections::BTreeSet;

use super::{Candidate, SqlCheck};
use crate::sql_refs::{parse_statements, referenced_tables};

/// Strict mode: every referenced relation must be in the schema catalog.
/// Unparseable candidates pass through; the database reports unknown tables.
pub struct KnownTables {
    tables: BTreeSet<String>,
}

impl KnownTables {
    pub fn new(tables: BTreeSet<String>) -> Self {
        Self {
            tables: tables.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }
}

impl SqlCheck for KnownTables {
    fn check(&self, candidate: &Candidate<'_>) -> Result<(), String> {
        let Ok(statements) = parse_statements(candidate.original) else {
            return Ok(());
        };
        let unknown: Vec<String> = referenced_tables(&statements)
            .into_iter()
            .filter(|t| !self.tables.contains(t))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(format!("Unknown table(s): {}", unknown.join(", ")))
        }
    }
}
