use bb8::{Pool, PooledConnection};
use bb8_postgres::PostgresConnectionManager;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tokio_postgres::NoTls;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_util::sync::CancellationToken;

pub mod pg_value;

/// One result row, column order as returned by the database.
pub type Row = Map<String, Value>;
pub type RowSet = Vec<Row>;

// ---------- errors ----------

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorError {
    /// Statement exceeded the server-side statement timeout.
    Timeout(String),
    /// Syntax or semantic error (undefined column, function, bad types).
    Syntax(String),
    UnknownTable(String),
    Other(String),
    /// No connection could be obtained from the pool.
    Unavailable(String),
    Cancelled,
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorError::Timeout(msg) => write!(f, "Query timed out: {msg}"),
            ExecutorError::Syntax(msg) => write!(f, "SQL error: {msg}"),
            ExecutorError::UnknownTable(msg) => write!(f, "Unknown table: {msg}"),
            ExecutorError::Other(msg) => write!(f, "Database error: {msg}"),
            ExecutorError::Unavailable(msg) => write!(f, "Database unavailable: {msg}"),
            ExecutorError::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::error::Error for ExecutorError {}

/// Map a driver error onto the executor's error kinds.
pub fn classify_error(e: &tokio_postgres::Error) -> ExecutorError {
    if let Some(db) = e.as_db_error() {
        let msg = db.message().to_string();
        let code = db.code();
        if *code == SqlState::QUERY_CANCELED {
            return ExecutorError::Timeout(msg);
        }
        if *code == SqlState::UNDEFINED_TABLE {
            return ExecutorError::UnknownTable(msg);
        }
        // class 42: syntax error or access rule violation
        if code.code().starts_with("42") {
            return ExecutorError::Syntax(msg);
        }
        return ExecutorError::Other(msg);
    }
    if is_connection_loss(e) {
        return ExecutorError::Unavailable(e.to_string());
    }
    ExecutorError::Other(e.to_string())
}

fn is_connection_loss(e: &tokio_postgres::Error) -> bool {
    e.is_closed()
        || std::error::Error::source(e).is_some_and(|s| s.is::<std::io::Error>())
}

// ---------- traits ----------

/// Source of read-only sessions. One session serves one request.
#[async_trait::async_trait]
pub trait ReadOnlyDatabase: Send + Sync {
    async fn session(&self) -> Result<Box<dyn ReadOnlySession>, ExecutorError>;
}

#[async_trait::async_trait]
pub trait ReadOnlySession: Send {
    /// Run one validated statement with no bound parameters.
    async fn fetch(
        &mut self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<RowSet, ExecutorError>;

    /// Run a lookup whose single parameter `$1` is a `text[]` of keys.
    async fn fetch_by_keys(
        &mut self,
        sql: &str,
        keys: &[String],
        cancel: &CancellationToken,
    ) -> Result<RowSet, ExecutorError>;
}

// ---------- postgres ----------

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub database_url: String,
    pub pool_size: u32,
    pub statement_timeout: Duration,
    pub max_retries: u32,
}

type PgManager = PostgresConnectionManager<NoTls>;
type PgPool = Pool<PgManager>;
type PgConn = PooledConnection<'static, PgManager>;

pub struct PostgresDatabase {
    pool: PgPool,
    statement_timeout: Duration,
    max_retries: u32,
}

impl PostgresDatabase {
    /// Connections are opened lazily; an unreachable database surfaces as
    /// `Unavailable` on first use rather than at startup.
    pub fn new(cfg: &ExecutorConfig) -> Result<Self, ExecutorError> {
        let manager = PostgresConnectionManager::new_from_stringlike(&cfg.database_url, NoTls)
            .map_err(|e| ExecutorError::Unavailable(e.to_string()))?;
        let pool = Pool::builder()
            .max_size(cfg.pool_size.max(1))
            .connection_timeout(Duration::from_secs(10))
            .build_unchecked(manager);
        Ok(Self {
            pool,
            statement_timeout: cfg.statement_timeout,
            max_retries: cfg.max_retries,
        })
    }
}

async fn acquire(pool: &PgPool, max_retries: u32) -> Result<PgConn, ExecutorError> {
    let mut attempt = 0;
    loop {
        match pool.get_owned().await {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                tracing::warn!(attempt, error = %e, "Failed to get pooled connection; retrying");
                tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
            }
            Err(e) => return Err(ExecutorError::Unavailable(e.to_string())),
        }
    }
}

#[async_trait::async_trait]
impl ReadOnlyDatabase for PostgresDatabase {
    async fn session(&self) -> Result<Box<dyn ReadOnlySession>, ExecutorError> {
        let conn = acquire(&self.pool, self.max_retries).await?;
        Ok(Box::new(PgSession {
            conn,
            pool: self.pool.clone(),
            statement_timeout: self.statement_timeout,
            max_retries: self.max_retries,
        }))
    }
}

enum Attempt {
    Db(tokio_postgres::Error),
    Cancelled,
}

/// A pooled connection that runs every statement in its own
/// `BEGIN READ ONLY … ROLLBACK` transaction.
pub struct PgSession {
    conn: PgConn,
    pool: PgPool,
    statement_timeout: Duration,
    max_retries: u32,
}

impl PgSession {
    async fn run_once(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
        cancel: &CancellationToken,
    ) -> Result<RowSet, Attempt> {
        let client: &tokio_postgres::Client = &self.conn;
        let begin = format!(
            "BEGIN READ ONLY; SET LOCAL statement_timeout = {}",
            self.statement_timeout.as_millis()
        );

        let work = async {
            client.batch_execute(&begin).await?;
            let rows = client.query(sql, params).await?;
            rows.iter()
                .map(pg_value::convert_row)
                .collect::<Result<RowSet, _>>()
        };

        let outcome = tokio::select! {
            res = work => res.map_err(Attempt::Db),
            _ = cancel.cancelled() => {
                if let Err(e) = client.cancel_token().cancel_query(NoTls).await {
                    tracing::warn!(error = %e, "Failed to cancel in-flight query");
                }
                Err(Attempt::Cancelled)
            }
        };

        if let Err(e) = client.batch_execute("ROLLBACK").await {
            tracing::debug!(error = %e, "ROLLBACK after read-only statement failed");
        }
        outcome
    }

    async fn run(
        &mut self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
        cancel: &CancellationToken,
    ) -> Result<RowSet, ExecutorError> {
        let mut attempt = 0;
        loop {
            match self.run_once(sql, params, cancel).await {
                Ok(rows) => return Ok(rows),
                Err(Attempt::Cancelled) => return Err(ExecutorError::Cancelled),
                Err(Attempt::Db(e)) if is_connection_loss(&e) && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "Connection lost; retrying on a fresh connection");
                    self.conn = acquire(&self.pool, self.max_retries).await?;
                }
                Err(Attempt::Db(e)) => return Err(classify_error(&e)),
            }
        }
    }
}

#[async_trait::async_trait]
impl ReadOnlySession for PgSession {
    async fn fetch(
        &mut self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<RowSet, ExecutorError> {
        let started = std::time::Instant::now();
        let rows = self.run(sql, &[], cancel).await?;
        tracing::debug!(rows = rows.len(), elapsed = ?started.elapsed(), "Executed generated SQL");
        Ok(rows)
    }

    async fn fetch_by_keys(
        &mut self,
        sql: &str,
        keys: &[String],
        cancel: &CancellationToken,
    ) -> Result<RowSet, ExecutorError> {
        let keys_param: &(dyn ToSql + Sync) = &keys;
        self.run(sql, &[keys_param], cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_message() {
        assert_eq!(
            ExecutorError::UnknownTable("relation \"x\" does not exist".into()).to_string(),
            "Unknown table: relation \"x\" does not exist"
        );
        assert_eq!(ExecutorError::Cancelled.to_string(), "Cancelled");
    }

    #[tokio::test]
    async fn bad_url_is_unavailable() {
        let cfg = ExecutorConfig {
            database_url: "not a url ===".into(),
            pool_size: 1,
            statement_timeout: Duration::from_secs(1),
            max_retries: 0,
        };
        assert!(matches!(
            PostgresDatabase::new(&cfg),
            Err(ExecutorError::Unavailable(_))
        ));
    }
}
