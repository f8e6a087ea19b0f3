use sea_orm::entity::prelude::*;
use uuid::Uuid;

/// One `/query` or `/query-map` run.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "query_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub endpoint: String,
    #[sea_orm(column_type = "Text")]
    pub query_text: String,
    pub intent: Option<String>,
    pub confidence: Option<f64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub sql_text: Option<String>,
    /// "ok" or "error"
    pub status: String,
    pub error_code: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    pub row_count: Option<i64>,
    pub feature_count: Option<i64>,
    pub execution_time_ms: i64,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
