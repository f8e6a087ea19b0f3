use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(QueryLog::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(QueryLog::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(QueryLog::Endpoint).string().not_null())
                    .col(ColumnDef::new(QueryLog::QueryText).text().not_null())
                    .col(ColumnDef::new(QueryLog::Intent).string().null())
                    .col(ColumnDef::new(QueryLog::Confidence).double().null())
                    .col(ColumnDef::new(QueryLog::SqlText).text().null())
                    .col(ColumnDef::new(QueryLog::Status).string().not_null())
                    .col(ColumnDef::new(QueryLog::ErrorCode).string().null())
                    .col(ColumnDef::new(QueryLog::ErrorMessage).text().null())
                    .col(ColumnDef::new(QueryLog::RowCount).big_integer().null())
                    .col(ColumnDef::new(QueryLog::FeatureCount).big_integer().null())
                    .col(
                        ColumnDef::new(QueryLog::ExecutionTimeMs)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(QueryLog::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_query_log_created_at")
                    .table(QueryLog::Table)
                    .col(QueryLog::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(QueryLog::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum QueryLog {
    Table,
    Id,
    Endpoint,
    QueryText,
    Intent,
    Confidence,
    SqlText,
    Status,
    ErrorCode,
    ErrorMessage,
    RowCount,
    FeatureCount,
    ExecutionTimeMs,
    CreatedAt,
}
