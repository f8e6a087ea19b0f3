//! Request orchestration: classify → prompt → generate → validate → execute →
//! enrich → shape, under one per-request deadline.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::catalog::SchemaCatalog;
use crate::enricher::Enricher;
use crate::executor::{ExecutorError, ReadOnlyDatabase, RowSet};
use crate::geojson::validate_feature_collection;
use crate::intent::{Intent, IntentVerdict, classify};
use crate::llm::{LlmError, SqlGenerator, clean_sql_output};
use crate::normalizer::{shape_spatial, shape_tabular};
use crate::prompt::{PromptBuilder, SpatialContext};
use crate::validator::SqlValidator;

// ---------- errors ----------

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    MalformedQuery(String),
    LlmUnavailable(String),
    InvalidSql { reason: String, sql: String },
    Database(ExecutorError),
    /// The per-request deadline expired.
    Timeout,
}

impl PipelineError {
    pub fn error_code(&self) -> &'static str {
        match self {
            PipelineError::MalformedQuery(_) => "MALFORMED_QUERY",
            PipelineError::LlmUnavailable(_) => "LLM_UNAVAILABLE",
            PipelineError::InvalidSql { .. } => "INVALID_SQL",
            PipelineError::Database(e) => match e {
                ExecutorError::Timeout(_) => "DB_TIMEOUT",
                ExecutorError::Syntax(_) => "DB_SYNTAX",
                ExecutorError::UnknownTable(_) => "DB_UNKNOWN_TABLE",
                ExecutorError::Unavailable(_) => "DB_UNAVAILABLE",
                ExecutorError::Other(_) => "DB_ERROR",
                ExecutorError::Cancelled => "TIMEOUT",
            },
            PipelineError::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::MalformedQuery(msg) => write!(f, "Malformed query: {msg}"),
            PipelineError::LlmUnavailable(msg) => write!(f, "SQL generation failed: {msg}"),
            PipelineError::InvalidSql { reason, .. } => write!(f, "Generated SQL rejected: {reason}"),
            PipelineError::Database(e) => write!(f, "{e}"),
            PipelineError::Timeout => write!(f, "Request timed out"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<LlmError> for PipelineError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Unavailable(msg) => PipelineError::LlmUnavailable(msg),
            LlmError::Cancelled => PipelineError::Timeout,
        }
    }
}

impl From<ExecutorError> for PipelineError {
    fn from(e: ExecutorError) -> Self {
        match e {
            ExecutorError::Cancelled => PipelineError::Timeout,
            other => PipelineError::Database(other),
        }
    }
}

// ---------- outcomes ----------

/// Result of the tabular surface.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub verdict: IntentVerdict,
    pub sql: String,
    pub row_count: usize,
    pub result: Value,
    pub execution_time_ms: u64,
}

/// Result of the map surface.
#[derive(Debug, Clone)]
pub struct MapOutcome {
    pub verdict: IntentVerdict,
    pub sql: String,
    pub row_count: usize,
    pub feature_count: usize,
    pub geojson: Value,
    pub valid_geojson: bool,
    pub execution_time_ms: u64,
}

/// A failed run keeps whatever was known when it failed, for the audit log.
#[derive(Debug, Clone)]
pub struct FailedRun {
    pub error: PipelineError,
    pub verdict: Option<IntentVerdict>,
    pub execution_time_ms: u64,
}

impl From<PipelineError> for FailedRun {
    fn from(error: PipelineError) -> Self {
        Self {
            error,
            verdict: None,
            execution_time_ms: 0,
        }
    }
}

// ---------- pipeline ----------

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_limit: u32,
    pub max_enrichment_ids: usize,
    pub request_timeout: Duration,
    pub strict_tables: bool,
    pub locale: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_limit: 1000,
            max_enrichment_ids: 1000,
            request_timeout: Duration::from_secs(30),
            strict_tables: false,
            locale: "id".to_string(),
        }
    }
}

pub struct QueryPipeline {
    catalog: Arc<SchemaCatalog>,
    prompts: PromptBuilder,
    validator: SqlValidator,
    llm: Arc<dyn SqlGenerator>,
    db: Arc<dyn ReadOnlyDatabase>,
    enricher: Enricher,
    request_timeout: Duration,
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn require_text(text: &str) -> Result<&str, PipelineError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::MalformedQuery("query text is empty".into()));
    }
    Ok(trimmed)
}

impl QueryPipeline {
    pub fn new(
        cfg: &PipelineConfig,
        catalog: Arc<SchemaCatalog>,
        llm: Arc<dyn SqlGenerator>,
        db: Arc<dyn ReadOnlyDatabase>,
    ) -> Self {
        let mut validator = SqlValidator::new(u64::from(cfg.max_limit));
        if cfg.strict_tables {
            validator = validator.with_known_tables(catalog.known_tables());
        }
        Self {
            prompts: PromptBuilder::new(cfg.max_limit, cfg.locale.clone()),
            validator,
            llm,
            db,
            enricher: Enricher::new(cfg.max_enrichment_ids),
            request_timeout: cfg.request_timeout,
            catalog,
        }
    }

    /// Classification only. Empty text yields the `unknown` verdict.
    pub fn detect_intent(&self, text: &str) -> IntentVerdict {
        classify(text)
    }

    /// `/query`: tabular shaping for every intent. Cancelling `cancel`
    /// abandons the LLM call and any in-flight statement.
    pub async fn run_query(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome, FailedRun> {
        let started = Instant::now();
        let text = require_text(text)?;
        let verdict = classify(text);
        tracing::info!(intent = %verdict.intent, confidence = verdict.confidence, "Classified query");

        let (sql, rows) = self
            .generate_and_execute(text, &verdict, &SpatialContext::default(), cancel)
            .await
            .map_err(|error| FailedRun {
                error,
                verdict: Some(verdict.clone()),
                execution_time_ms: elapsed_ms(started),
            })?;

        let row_count = rows.len();
        let result = shape_tabular(verdict.intent, rows);
        Ok(QueryOutcome {
            verdict,
            sql,
            row_count,
            result,
            execution_time_ms: elapsed_ms(started),
        })
    }

    /// `/query-map`: spatial shaping. Non-spatial verdicts are promoted to
    /// `location` before the prompt is built.
    pub async fn run_map_query(
        &self,
        text: &str,
        spatial: &SpatialContext,
        cancel: &CancellationToken,
    ) -> Result<MapOutcome, FailedRun> {
        let started = Instant::now();
        let text = require_text(text)?;
        spatial.check().map_err(PipelineError::MalformedQuery)?;
        let mut verdict = classify(text);
        if !verdict.intent.is_spatial() {
            verdict = verdict.with_intent(Intent::Location);
        }
        tracing::info!(intent = %verdict.intent, confidence = verdict.confidence, "Classified map query");

        let (sql, rows) = self
            .generate_and_execute(text, &verdict, spatial, cancel)
            .await
            .map_err(|error| FailedRun {
                error,
                verdict: Some(verdict.clone()),
                execution_time_ms: elapsed_ms(started),
            })?;

        let fc = shape_spatial(verdict.intent, &rows, text, spatial);
        let feature_count = fc.data_features().count();
        let (geojson, valid_geojson) = match serde_json::to_value(&fc) {
            Ok(v) => {
                let valid = validate_feature_collection(&v);
                (v, valid)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialise FeatureCollection");
                (Value::Null, false)
            }
        };
        tracing::info!(
            intent = %verdict.intent,
            rows = rows.len(),
            features = feature_count,
            valid_geojson,
            "Built map response"
        );

        Ok(MapOutcome {
            verdict,
            sql,
            row_count: rows.len(),
            feature_count,
            geojson,
            valid_geojson,
            execution_time_ms: elapsed_ms(started),
        })
    }

    /// LLM through enrichment, cancelled as a whole when the deadline passes
    /// or the caller cancels `parent`.
    async fn generate_and_execute(
        &self,
        text: &str,
        verdict: &IntentVerdict,
        spatial: &SpatialContext,
        parent: &CancellationToken,
    ) -> Result<(String, RowSet), PipelineError> {
        let cancel = parent.child_token();
        let timer = {
            let cancel = cancel.clone();
            let timeout = self.request_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                cancel.cancel();
            })
        };

        let result = self.stages(text, verdict, spatial, &cancel).await;
        timer.abort();

        if result.is_err() && parent.is_cancelled() {
            tracing::info!(intent = %verdict.intent, "Query abandoned by caller");
        } else if let Err(e) = &result {
            tracing::warn!(intent = %verdict.intent, error = %e, code = e.error_code(), "Query pipeline failed");
        }
        result
    }

    async fn stages(
        &self,
        text: &str,
        verdict: &IntentVerdict,
        spatial: &SpatialContext,
        cancel: &CancellationToken,
    ) -> Result<(String, RowSet), PipelineError> {
        let prompt = self.prompts.build(text, verdict, &self.catalog, spatial);
        let raw = self.llm.generate(&prompt, cancel).await?;
        let sql = clean_sql_output(&raw);
        tracing::debug!(intent = %verdict.intent, sql = %sql, "Generated SQL");

        let check = self.validator.validate(&sql);
        if !check.valid {
            return Err(PipelineError::InvalidSql {
                reason: check.reason.unwrap_or_default(),
                sql,
            });
        }

        let mut session = tokio::select! {
            res = self.db.session() => res?,
            _ = cancel.cancelled() => return Err(PipelineError::Timeout),
        };
        let rows = session.fetch(&sql, cancel).await?;
        let rows = self.enricher.enrich(rows, session.as_mut(), cancel).await?;
        drop(session);

        Ok((sql, rows))
    }
}
