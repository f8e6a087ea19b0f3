//! In-memory stand-ins for the database and the LLM, shared by unit tests.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::executor::{ExecutorError, ReadOnlyDatabase, ReadOnlySession, RowSet};
use crate::llm::{LlmError, SqlGenerator};
use crate::prompt::Prompt;

/// `json!([{..}, {..}])` → RowSet.
pub fn rows(value: Value) -> RowSet {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => map,
                other => panic!("row must be an object, got {other}"),
            })
            .collect(),
        other => panic!("rows must be an array, got {other}"),
    }
}

#[derive(Clone)]
pub struct FakeDatabase {
    primary: Result<RowSet, ExecutorError>,
    lookups: Vec<(&'static str, Result<RowSet, ExecutorError>)>,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeDatabase {
    pub fn returning(rows: RowSet) -> Self {
        Self {
            primary: Ok(rows),
            lookups: vec![],
            log: Arc::new(Mutex::new(vec![])),
        }
    }

    pub fn failing(err: ExecutorError) -> Self {
        Self {
            primary: Err(err),
            ..Self::returning(vec![])
        }
    }

    pub fn with_lookup(mut self, table: &'static str, rows: RowSet) -> Self {
        self.lookups.push((table, Ok(rows)));
        self
    }

    pub fn with_failing_lookup(mut self, table: &'static str, err: ExecutorError) -> Self {
        self.lookups.push((table, Err(err)));
        self
    }

    /// Every statement sent to any session, in order.
    pub fn executed(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ReadOnlyDatabase for FakeDatabase {
    async fn session(&self) -> Result<Box<dyn ReadOnlySession>, ExecutorError> {
        Ok(Box::new(FakeSession { db: self.clone() }))
    }
}

struct FakeSession {
    db: FakeDatabase,
}

#[async_trait::async_trait]
impl ReadOnlySession for FakeSession {
    async fn fetch(
        &mut self,
        sql: &str,
        _cancel: &CancellationToken,
    ) -> Result<RowSet, ExecutorError> {
        self.db.log.lock().unwrap().push(sql.to_string());
        self.db.primary.clone()
    }

    async fn fetch_by_keys(
        &mut self,
        sql: &str,
        _keys: &[String],
        _cancel: &CancellationToken,
    ) -> Result<RowSet, ExecutorError> {
        self.db.log.lock().unwrap().push(sql.to_string());
        self.db
            .lookups
            .iter()
            .find(|(table, _)| sql.contains(&format!("FROM {table} ")))
            .map(|(_, result)| result.clone())
            .unwrap_or_else(|| Ok(vec![]))
    }
}

/// Returns a canned SQL string (or error) and records the prompts it saw.
#[derive(Clone)]
pub struct FakeLlm {
    reply: Result<String, LlmError>,
    delay: Option<std::time::Duration>,
    prompts: Arc<Mutex<Vec<Prompt>>>,
    cancelled: Arc<AtomicBool>,
}

impl FakeLlm {
    pub fn replying(sql: &str) -> Self {
        Self {
            reply: Ok(sql.to_string()),
            delay: None,
            prompts: Arc::new(Mutex::new(vec![])),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            reply: Err(LlmError::Unavailable(msg.to_string())),
            ..Self::replying("")
        }
    }

    /// Waits before replying; used to trip the request deadline.
    pub fn slow(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<Prompt> {
        self.prompts.lock().unwrap().last().cloned()
    }

    /// True once a call returned early because its token was cancelled.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SqlGenerator for FakeLlm {
    async fn generate(&self, prompt: &Prompt, cancel: &CancellationToken) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    self.cancelled.store(true, Ordering::SeqCst);
                    return Err(LlmError::Cancelled);
                }
            }
        }
        self.reply.clone()
    }
}
