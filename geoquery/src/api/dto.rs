use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::entity::query_log;
use crate::intent::Intent;
use crate::pipeline::{MapOutcome, QueryOutcome};
use crate::prompt::SpatialContext;

// ---------- requests ----------

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct MapQueryRequest {
    #[serde(default)]
    pub query: String,
    pub center_lat: Option<f64>,
    pub center_lon: Option<f64>,
    pub radius_km: Option<f64>,
}

impl MapQueryRequest {
    pub fn spatial_context(&self) -> SpatialContext {
        SpatialContext {
            center_lat: self.center_lat,
            center_lon: self.center_lon,
            radius_km: self.radius_km,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQueryLogQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub intent: Option<String>,
}

// ---------- responses ----------

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub intent: Intent,
    pub confidence: f64,
    pub sql_query: String,
    pub result: Value,
    pub execution_time_ms: u64,
}

impl From<QueryOutcome> for QueryResponse {
    fn from(out: QueryOutcome) -> Self {
        Self {
            intent: out.verdict.intent,
            confidence: out.verdict.confidence,
            sql_query: out.sql,
            result: out.result,
            execution_time_ms: out.execution_time_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MapQueryResponse {
    pub intent: Intent,
    pub confidence: f64,
    pub sql_query: String,
    pub row_count: usize,
    pub geojson: Value,
    pub execution_time_ms: u64,
    pub valid_geojson: bool,
}

impl From<MapOutcome> for MapQueryResponse {
    fn from(out: MapOutcome) -> Self {
        Self {
            intent: out.verdict.intent,
            confidence: out.verdict.confidence,
            sql_query: out.sql,
            row_count: out.row_count,
            geojson: out.geojson,
            execution_time_ms: out.execution_time_ms,
            valid_geojson: out.valid_geojson,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueryLogResponse {
    pub id: Uuid,
    pub endpoint: String,
    pub query_text: String,
    pub intent: Option<String>,
    pub confidence: Option<f64>,
    pub sql_text: Option<String>,
    pub status: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub row_count: Option<i64>,
    pub feature_count: Option<i64>,
    pub execution_time_ms: i64,
    pub created_at: NaiveDateTime,
}

impl From<query_log::Model> for QueryLogResponse {
    fn from(m: query_log::Model) -> Self {
        Self {
            id: m.id,
            endpoint: m.endpoint,
            query_text: m.query_text,
            intent: m.intent,
            confidence: m.confidence,
            sql_text: m.sql_text,
            status: m.status,
            error_code: m.error_code,
            error_message: m.error_message,
            row_count: m.row_count,
            feature_count: m.feature_count,
            execution_time_ms: m.execution_time_ms,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}
