use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde_json::Value;

use super::dto::{ListQueryLogQuery, PaginatedResponse, QueryLogResponse};
use super::{ApiErr, AppState, success};

// ---------- GET /query-log ----------

pub async fn list_query_log(
    State(state): State<AppState>,
    Query(params): Query<ListQueryLogQuery>,
) -> Result<Json<Value>, ApiErr> {
    let Some(audit) = &state.audit else {
        return Err(ApiErr::new(StatusCode::SERVICE_UNAVAILABLE, "Query log is disabled")
            .with_code("AUDIT_DISABLED"));
    };

    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(20).clamp(1, 100);
    let intent = params.intent.as_deref().filter(|s| !s.is_empty());

    let (items, total) = audit
        .list(page, page_size, intent)
        .await
        .map_err(ApiErr::internal)?;

    Ok(success(
        "Query log",
        PaginatedResponse {
            data: items.into_iter().map(QueryLogResponse::from).collect(),
            total,
            page,
            page_size,
        },
    ))
}
