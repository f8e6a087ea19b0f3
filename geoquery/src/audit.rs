//! Best-effort audit trail of pipeline runs, kept in a separate SeaORM store.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::entity::query_log;
use crate::pipeline::{FailedRun, MapOutcome, QueryOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Query,
    QueryMap,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Query => "query",
            Endpoint::QueryMap => "query-map",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub endpoint: Endpoint,
    pub query_text: String,
    pub intent: Option<String>,
    pub confidence: Option<f64>,
    pub sql_text: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub row_count: Option<i64>,
    pub feature_count: Option<i64>,
    pub execution_time_ms: u64,
}

fn as_i64(n: usize) -> Option<i64> {
    i64::try_from(n).ok()
}

impl AuditEntry {
    pub fn from_query(text: &str, out: &QueryOutcome) -> Self {
        Self {
            endpoint: Endpoint::Query,
            query_text: text.to_string(),
            intent: Some(out.verdict.intent.as_str().to_string()),
            confidence: Some(out.verdict.confidence),
            sql_text: Some(out.sql.clone()),
            error_code: None,
            error_message: None,
            row_count: as_i64(out.row_count),
            feature_count: None,
            execution_time_ms: out.execution_time_ms,
        }
    }

    pub fn from_map_query(text: &str, out: &MapOutcome) -> Self {
        Self {
            endpoint: Endpoint::QueryMap,
            query_text: text.to_string(),
            intent: Some(out.verdict.intent.as_str().to_string()),
            confidence: Some(out.verdict.confidence),
            sql_text: Some(out.sql.clone()),
            error_code: None,
            error_message: None,
            row_count: as_i64(out.row_count),
            feature_count: as_i64(out.feature_count),
            execution_time_ms: out.execution_time_ms,
        }
    }

    pub fn from_failure(endpoint: Endpoint, text: &str, failed: &FailedRun) -> Self {
        let sql_text = match &failed.error {
            crate::pipeline::PipelineError::InvalidSql { sql, .. } => Some(sql.clone()),
            _ => None,
        };
        Self {
            endpoint,
            query_text: text.to_string(),
            intent: failed.verdict.as_ref().map(|v| v.intent.as_str().to_string()),
            confidence: failed.verdict.as_ref().map(|v| v.confidence),
            sql_text,
            error_code: Some(failed.error.error_code().to_string()),
            error_message: Some(failed.error.to_string()),
            row_count: None,
            feature_count: None,
            execution_time_ms: failed.execution_time_ms,
        }
    }

    pub fn status(&self) -> &'static str {
        if self.error_code.is_some() { "error" } else { "ok" }
    }
}

#[derive(Clone)]
pub struct AuditLog {
    db: DatabaseConnection,
}

impl AuditLog {
    /// Connect and bring the schema up to date.
    pub async fn connect(url: &str) -> Result<Self, DbErr> {
        use migration::{Migrator, MigratorTrait};

        let db = Database::connect(url).await?;
        Migrator::up(&db, None).await?;
        Ok(Self { db })
    }

    pub async fn insert(&self, entry: &AuditEntry) -> Result<Uuid, DbErr> {
        let id = Uuid::now_v7();
        query_log::ActiveModel {
            id: Set(id),
            endpoint: Set(entry.endpoint.as_str().to_string()),
            query_text: Set(entry.query_text.clone()),
            intent: Set(entry.intent.clone()),
            confidence: Set(entry.confidence),
            sql_text: Set(entry.sql_text.clone()),
            status: Set(entry.status().to_string()),
            error_code: Set(entry.error_code.clone()),
            error_message: Set(entry.error_message.clone()),
            row_count: Set(entry.row_count),
            feature_count: Set(entry.feature_count),
            execution_time_ms: Set(i64::try_from(entry.execution_time_ms).unwrap_or(i64::MAX)),
            created_at: Set(Utc::now().naive_utc()),
        }
        .insert(&self.db)
        .await?;
        Ok(id)
    }

    /// Never fails the caller; a failed write is only logged.
    pub async fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.insert(&entry).await {
            tracing::warn!(error = %e, endpoint = entry.endpoint.as_str(), "Failed to write query log entry");
        }
    }

    /// Newest first. `page` is 1-based.
    pub async fn list(
        &self,
        page: u64,
        page_size: u64,
        intent: Option<&str>,
    ) -> Result<(Vec<query_log::Model>, u64), DbErr> {
        let mut query = query_log::Entity::find();
        if let Some(intent) = intent {
            query = query.filter(query_log::Column::Intent.eq(intent));
        }
        let paginator = query
            .order_by_desc(query_log::Column::CreatedAt)
            .order_by_desc(query_log::Column::Id)
            .paginate(&self.db, page_size.max(1));

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.max(1) - 1).await?;
        Ok((items, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::classify;
    use crate::pipeline::PipelineError;

    async fn store() -> AuditLog {
        AuditLog::connect("sqlite::memory:").await.unwrap()
    }

    fn ok_entry(intent: &str, n: usize) -> AuditEntry {
        AuditEntry {
            endpoint: Endpoint::Query,
            query_text: format!("q{n}"),
            intent: Some(intent.to_string()),
            confidence: Some(0.5),
            sql_text: Some("SELECT 1 LIMIT 1".into()),
            error_code: None,
            error_message: None,
            row_count: Some(1),
            feature_count: None,
            execution_time_ms: 3,
        }
    }

    #[tokio::test]
    async fn insert_and_list_newest_first() {
        let log = store().await;
        for n in 0..3 {
            log.insert(&ok_entry("count", n)).await.unwrap();
        }
        let (items, total) = log.list(1, 2, None).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].query_text, "q2");
        assert_eq!(items[0].status, "ok");

        let (rest, _) = log.list(2, 2, None).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].query_text, "q0");
    }

    #[tokio::test]
    async fn filter_by_intent() {
        let log = store().await;
        log.insert(&ok_entry("count", 0)).await.unwrap();
        log.insert(&ok_entry("location", 1)).await.unwrap();
        let (items, total) = log.list(1, 20, Some("location")).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].intent.as_deref(), Some("location"));
    }

    #[tokio::test]
    async fn failures_keep_code_and_candidate_sql() {
        let log = store().await;
        let failed = FailedRun {
            error: PipelineError::InvalidSql {
                reason: "Disallowed keyword DELETE in generated SQL".into(),
                sql: "DELETE FROM santri".into(),
            },
            verdict: Some(classify("hapus santri")),
            execution_time_ms: 7,
        };
        let entry = AuditEntry::from_failure(Endpoint::QueryMap, "hapus santri", &failed);
        assert_eq!(entry.status(), "error");
        log.record(entry).await;

        let (items, _) = log.list(1, 20, None).await.unwrap();
        assert_eq!(items[0].endpoint, "query-map");
        assert_eq!(items[0].error_code.as_deref(), Some("INVALID_SQL"));
        assert_eq!(items[0].sql_text.as_deref(), Some("DELETE FROM santri"));
    }
}
