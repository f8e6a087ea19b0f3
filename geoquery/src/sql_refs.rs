use sqlparser::ast::{ObjectName, ObjectNamePart, Query, Statement, Visit, Visitor};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::{Parser, ParserError};
use std::collections::BTreeSet;
use std::ops::ControlFlow;

/// Parse SQL text with the PostgreSQL dialect.
pub fn parse_statements(sql: &str) -> Result<Vec<Statement>, ParserError> {
    Parser::parse_sql(&PostgreSqlDialect {}, sql)
}

/// Collects every relation named in FROM / JOIN positions, minus CTE names.
#[derive(Default)]
struct RelationCollector {
    relations: BTreeSet<String>,
    ctes: BTreeSet<String>,
}

impl Visitor for RelationCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_lowercase());
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        // `public.santri_pribadi` and `santri_pribadi` both resolve to the bare table name
        if let Some(ObjectNamePart::Identifier(ident)) = relation.0.last() {
            self.relations.insert(ident.value.to_lowercase());
        }
        ControlFlow::Continue(())
    }
}

/// Lowercased table names referenced by the statements (CTE aliases excluded).
pub fn referenced_tables(statements: &[Statement]) -> BTreeSet<String> {
    let mut collector = RelationCollector::default();
    for statement in statements {
        let _ = statement.visit(&mut collector);
    }
    collector
        .relations
        .into_iter()
        .filter(|name| !collector.ctes.contains(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables_of(sql: &str) -> Vec<String> {
        let statements = parse_statements(sql).expect("failed to parse SQL");
        referenced_tables(&statements).into_iter().collect()
    }

    #[test]
    fn join_collects_both_tables() {
        let tables = tables_of(
            "SELECT sp.nama, ss.skor_total FROM santri_pribadi sp \
             JOIN santri_skor ss ON sp.id = ss.santri_id LIMIT 10",
        );
        assert_eq!(tables, vec!["santri_pribadi", "santri_skor"]);
    }

    #[test]
    fn schema_qualifier_is_dropped() {
        assert_eq!(tables_of("SELECT 1 FROM public.Pondok_Pesantren LIMIT 1"), vec!["pondok_pesantren"]);
    }

    #[test]
    fn cte_alias_is_not_a_table() {
        let tables = tables_of(
            "WITH top AS (SELECT santri_id FROM santri_skor LIMIT 5) \
             SELECT * FROM top LIMIT 5",
        );
        assert_eq!(tables, vec!["santri_skor"]);
    }

    #[test]
    fn subquery_tables_are_found() {
        let tables = tables_of(
            "SELECT nama FROM pondok_pesantren WHERE id IN \
             (SELECT pesantren_id FROM pesantren_skor WHERE skor_total > 80) LIMIT 10",
        );
        assert_eq!(tables, vec!["pesantren_skor", "pondok_pesantren"]);
    }
}
