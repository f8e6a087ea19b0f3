//! Service configuration from `GQ_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::executor::ExecutorConfig;
use crate::llm::LlmConfig;
use crate::pipeline::PipelineConfig;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub llm: LlmConfig,
    pub executor: ExecutorConfig,
    pub pipeline: PipelineConfig,
    pub catalog_path: PathBuf,
    pub audit_database_url: String,
    pub bind_addr: String,
    pub cors_allowed_origins: Vec<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source. Unset, empty or unparsable values
    /// fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let string = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let parsed = |key: &str| get(key).and_then(|v| v.trim().parse::<u64>().ok());

        let request_timeout = Duration::from_secs(parsed("GQ_REQUEST_TIMEOUT_SECS").unwrap_or(30).max(1));
        let max_limit = parsed("GQ_MAX_LIMIT")
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(1000);

        Self {
            llm: LlmConfig {
                base_url: string("GQ_LLM_BASE_URL", "https://api.openai.com/v1"),
                model: string("GQ_LLM_MODEL", "gpt-4o-mini"),
                api_key: get("GQ_LLM_API_KEY"),
                temperature: get("GQ_LLM_TEMPERATURE")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0.0),
                max_tokens: parsed("GQ_LLM_MAX_TOKENS")
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(800),
                timeout: request_timeout,
            },
            executor: ExecutorConfig {
                database_url: string("GQ_DATABASE_URL", "postgres://postgres@localhost/pesantren"),
                pool_size: parsed("GQ_DB_POOL_SIZE")
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(16),
                statement_timeout: request_timeout,
                max_retries: parsed("GQ_DB_MAX_RETRIES")
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(2),
            },
            pipeline: PipelineConfig {
                max_limit,
                max_enrichment_ids: parsed("GQ_MAX_ENRICHMENT_IDS")
                    .and_then(|v| usize::try_from(v).ok())
                    .unwrap_or(1000),
                request_timeout,
                strict_tables: get("GQ_STRICT_TABLES")
                    .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                    .unwrap_or(false),
                locale: string("GQ_LOCALE", "id"),
            },
            catalog_path: PathBuf::from(string("GQ_SCHEMA_CATALOG", "catalog/schema.json")),
            audit_database_url: string(
                "GQ_AUDIT_DATABASE_URL",
                "sqlite://geoquery_audit.db?mode=rwc",
            ),
            bind_addr: string("GQ_BIND_ADDR", "127.0.0.1:8080"),
            cors_allowed_origins: get("GQ_CORS_ALLOWED_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }
}

/// Mask the password in a connection URL and drop its query string, for logs.
pub fn redact_db_url(url: &str) -> String {
    let base = url.split('?').next().unwrap_or(url);
    let Some(scheme_end) = base.find("://") else {
        return base.to_string();
    };
    let authority = &base[scheme_end + 3..];
    match authority.rfind('@') {
        Some(at) => {
            let user = authority[..at].split(':').next().unwrap_or_default();
            let masked = if authority[..at].contains(':') { ":****" } else { "" };
            format!("{}://{user}{masked}{}", &base[..scheme_end], &authority[at..])
        }
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> ServiceConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.llm.base_url, "https://api.openai.com/v1");
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(cfg.llm.api_key, None);
        assert_eq!(cfg.llm.max_tokens, 800);
        assert_eq!(cfg.pipeline.max_limit, 1000);
        assert_eq!(cfg.pipeline.max_enrichment_ids, 1000);
        assert_eq!(cfg.pipeline.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.executor.statement_timeout, Duration::from_secs(30));
        assert_eq!(cfg.executor.pool_size, 16);
        assert!(!cfg.pipeline.strict_tables);
        assert_eq!(cfg.bind_addr, "127.0.0.1:8080");
        assert!(cfg.cors_allowed_origins.is_empty());
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("GQ_LLM_MODEL", "qwen2.5-coder"),
            ("GQ_LLM_API_KEY", "sk-test"),
            ("GQ_LLM_TEMPERATURE", "0.2"),
            ("GQ_REQUEST_TIMEOUT_SECS", "12"),
            ("GQ_MAX_LIMIT", "500"),
            ("GQ_STRICT_TABLES", "true"),
            ("GQ_CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
        ]);
        assert_eq!(cfg.llm.model, "qwen2.5-coder");
        assert_eq!(cfg.llm.api_key.as_deref(), Some("sk-test"));
        assert!((cfg.llm.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(cfg.llm.timeout, Duration::from_secs(12));
        assert_eq!(cfg.pipeline.max_limit, 500);
        assert!(cfg.pipeline.strict_tables);
        assert_eq!(cfg.cors_allowed_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn redacts_passwords() {
        assert_eq!(
            redact_db_url("postgres://reader:s3cret@db:5432/pesantren?sslmode=require"),
            "postgres://reader:****@db:5432/pesantren"
        );
        assert_eq!(redact_db_url("postgres://reader@db/pesantren"), "postgres://reader@db/pesantren");
        assert_eq!(redact_db_url("sqlite://geoquery_audit.db?mode=rwc"), "sqlite://geoquery_audit.db");
        assert_eq!(redact_db_url("not a url"), "not a url");
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let cfg = config(&[("GQ_MAX_LIMIT", "lots"), ("GQ_DB_POOL_SIZE", ""), ("GQ_LLM_API_KEY", " ")]);
        assert_eq!(cfg.pipeline.max_limit, 1000);
        assert_eq!(cfg.executor.pool_size, 16);
        assert_eq!(cfg.llm.api_key, None);
    }
}
