use axum::{
    extract::{State, rejection::JsonRejection},
    response::Json,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::dto::{MapQueryRequest, MapQueryResponse, QueryRequest, QueryResponse};
use super::{ApiErr, AppState, success};
use crate::audit::{AuditEntry, Endpoint};

// ---------- POST /query ----------

pub async fn query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiErr> {
    let Json(req) = body.map_err(ApiErr::from_rejection)?;

    // The run is spawned so a client disconnect cannot drop it halfway
    // through a transaction. Dropping this handler fires the guard, which
    // cancels the LLM call or SELECT; the session still rolls back.
    let cancel = CancellationToken::new();
    let _abandon = cancel.clone().drop_guard();
    let pipeline = state.pipeline.clone();
    let text = req.query.clone();
    let run = tokio::spawn(async move { pipeline.run_query(&text, &cancel).await })
        .await
        .map_err(ApiErr::internal)?;

    match run {
        Ok(out) => {
            state.record(AuditEntry::from_query(&req.query, &out)).await;
            Ok(success("Query executed", QueryResponse::from(out)))
        }
        Err(failed) => {
            state
                .record(AuditEntry::from_failure(Endpoint::Query, &req.query, &failed))
                .await;
            Err(failed.error.into())
        }
    }
}

// ---------- POST /query-map ----------

pub async fn query_map(
    State(state): State<AppState>,
    body: Result<Json<MapQueryRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiErr> {
    let Json(req) = body.map_err(ApiErr::from_rejection)?;

    let cancel = CancellationToken::new();
    let _abandon = cancel.clone().drop_guard();
    let pipeline = state.pipeline.clone();
    let text = req.query.clone();
    let spatial = req.spatial_context();
    let run =
        tokio::spawn(async move { pipeline.run_map_query(&text, &spatial, &cancel).await })
            .await
            .map_err(ApiErr::internal)?;

    match run {
        Ok(out) => {
            state
                .record(AuditEntry::from_map_query(&req.query, &out))
                .await;
            Ok(success("Map query executed", MapQueryResponse::from(out)))
        }
        Err(failed) => {
            state
                .record(AuditEntry::from_failure(Endpoint::QueryMap, &req.query, &failed))
                .await;
            Err(failed.error.into())
        }
    }
}

// ---------- POST /detect-intent ----------

pub async fn detect_intent(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiErr> {
    let Json(req) = body.map_err(ApiErr::from_rejection)?;
    let verdict = state.pipeline.detect_intent(&req.query);
    Ok(success("Intent detected", verdict))
}
