use axum::{
    Router,
    extract::rejection::JsonRejection,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::set_header::response::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::audit::{AuditEntry, AuditLog};
use crate::executor::ExecutorError;
use crate::pipeline::{PipelineError, QueryPipeline};

pub mod dto;
pub mod log_handlers;
pub mod map_handlers;
pub mod query_handlers;

// ---------- shared state ----------

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<QueryPipeline>,
    /// None when the audit store could not be opened at startup.
    pub audit: Option<AuditLog>,
}

impl AppState {
    pub async fn record(&self, entry: AuditEntry) {
        if let Some(audit) = &self.audit {
            audit.record(entry).await;
        }
    }
}

// ---------- envelopes ----------

/// `{"success": true, "message": ..., "data": ...}`
pub fn success<T: Serialize>(message: &str, data: T) -> Json<Value> {
    Json(json!({ "success": true, "message": message, "data": data }))
}

/// A failure envelope: `{"success": false, "message", "errors"?, "error_code"?}`.
#[derive(Debug)]
pub struct ApiErr {
    status: StatusCode,
    message: String,
    error_code: Option<&'static str>,
    errors: Option<Value>,
}

impl ApiErr {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            error_code: None,
            errors: None,
        }
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).with_code("INTERNAL")
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.error_code = Some(code);
        self
    }

    pub fn with_errors(mut self, errors: Value) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Unreadable request bodies are reported like an empty query.
    pub fn from_rejection(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
            .with_code("MALFORMED_QUERY")
    }
}

impl From<PipelineError> for ApiErr {
    fn from(e: PipelineError) -> Self {
        let status = match &e {
            PipelineError::MalformedQuery(_) | PipelineError::InvalidSql { .. } => {
                StatusCode::BAD_REQUEST
            }
            PipelineError::LlmUnavailable(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Database(db) => match db {
                ExecutorError::Syntax(_) | ExecutorError::UnknownTable(_) => {
                    StatusCode::BAD_REQUEST
                }
                ExecutorError::Timeout(_) | ExecutorError::Cancelled => {
                    StatusCode::GATEWAY_TIMEOUT
                }
                ExecutorError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                ExecutorError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };
        let mut err = ApiErr::new(status, e.to_string()).with_code(e.error_code());
        if let PipelineError::InvalidSql { reason, sql } = e {
            err = err.with_errors(json!({ "reason": reason, "sql": sql }));
        }
        err
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let mut body = json!({ "success": false, "message": self.message });
        if let Some(errors) = self.errors {
            body["errors"] = errors;
        }
        if let Some(code) = self.error_code {
            body["error_code"] = json!(code);
        }
        (self.status, Json(body)).into_response()
    }
}

// ---------- router ----------

pub fn router(state: AppState, cors_allowed_origins: &[String]) -> Router {
    let allowed_origins: Vec<HeaderValue> = cors_allowed_origins
        .iter()
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let cors = if allowed_origins.is_empty() {
        CorsLayer::new() // no origins allowed = same-origin only
    } else {
        CorsLayer::new()
            .allow_origin(allowed_origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .nest("/api/v1", api_v1())
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(NormalizePathLayer::trim_trailing_slash())
        .with_state(state)
}

fn api_v1() -> Router<AppState> {
    Router::new()
        .route("/query", post(query_handlers::query))
        .route("/query-map", post(query_handlers::query_map))
        .route("/detect-intent", post(query_handlers::detect_intent))
        .route("/map/schema", get(map_handlers::map_schema))
        .route("/query-log", get(log_handlers::list_query_log))
}
