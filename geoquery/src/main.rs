use clap::{Parser, Subcommand};
use geoquery::api::{AppState, dto, router};
use geoquery::audit::AuditLog;
use geoquery::catalog::SchemaCatalog;
use geoquery::config::{ServiceConfig, redact_db_url};
use geoquery::executor::PostgresDatabase;
use geoquery::llm::ChatCompletionsClient;
use geoquery::pipeline::QueryPipeline;
use geoquery::prompt::SpatialContext;
use geoquery::validator::SqlValidator;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "geoquery", about = "Natural-language SQL with GeoJSON output for pesantren data")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API (default)
    Serve,
    /// Run one question through the full pipeline and print the response
    Ask {
        text: String,
        /// Shape the answer as GeoJSON (the /query-map surface)
        #[arg(long, action = clap::ArgAction::SetTrue)]
        map: bool,
        #[arg(long, allow_hyphen_values = true)]
        center_lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        center_lon: Option<f64>,
        #[arg(long)]
        radius_km: Option<f64>,
    },
    /// Classify a question without generating SQL
    DetectIntent { text: String },
    /// Check a SQL string against the read-only rules
    ValidateSql { sql: String },
    /// Print the schema catalog as rendered into the prompt
    Schema,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Init structured logging (respects RUST_LOG; defaults to info)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Load .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let cfg = ServiceConfig::from_env();

    let catalog = match SchemaCatalog::load(&cfg.catalog_path) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("FATAL: {e}. Set GQ_SCHEMA_CATALOG to a valid catalog file.");
            std::process::exit(1);
        }
    };
    tracing::info!(
        path = %cfg.catalog_path.display(),
        tables = catalog.tables().count(),
        "Schema catalog loaded"
    );

    match cli.command {
        None | Some(Commands::Serve) => serve(cfg, catalog).await?,
        Some(Commands::Ask {
            text,
            map,
            center_lat,
            center_lon,
            radius_km,
        }) => {
            let spatial = SpatialContext {
                center_lat,
                center_lon,
                radius_km,
            };
            ask(cfg, catalog, &text, map.then_some(spatial)).await?;
        }
        Some(Commands::DetectIntent { text }) => {
            let verdict = geoquery::intent::classify(&text);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Some(Commands::ValidateSql { sql }) => {
            let mut validator = SqlValidator::new(u64::from(cfg.pipeline.max_limit));
            if cfg.pipeline.strict_tables {
                validator = validator.with_known_tables(catalog.known_tables());
            }
            let verdict = validator.validate(&sql);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            if !verdict.valid {
                std::process::exit(2);
            }
        }
        Some(Commands::Schema) => {
            print!("{}", catalog.render_for_prompt());
        }
    }

    Ok(())
}

fn build_pipeline(
    cfg: &ServiceConfig,
    catalog: Arc<SchemaCatalog>,
) -> Result<QueryPipeline, Box<dyn std::error::Error>> {
    tracing::info!(
        database = %redact_db_url(&cfg.executor.database_url),
        pool_size = cfg.executor.pool_size,
        "Configuring read-only database pool"
    );
    let db = PostgresDatabase::new(&cfg.executor)?;

    tracing::info!(base_url = %cfg.llm.base_url, model = %cfg.llm.model, "Configuring LLM client");
    if cfg.llm.api_key.is_none() {
        tracing::warn!("GQ_LLM_API_KEY not set; requests are sent without authorization");
    }
    let llm = ChatCompletionsClient::new(cfg.llm.clone())?;

    Ok(QueryPipeline::new(
        &cfg.pipeline,
        catalog,
        Arc::new(llm),
        Arc::new(db),
    ))
}

async fn serve(
    cfg: ServiceConfig,
    catalog: Arc<SchemaCatalog>,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = Arc::new(build_pipeline(&cfg, catalog)?);

    tracing::info!(database = %redact_db_url(&cfg.audit_database_url), "Opening query log");
    let audit = match AuditLog::connect(&cfg.audit_database_url).await {
        Ok(a) => Some(a),
        Err(e) => {
            tracing::warn!(error = %e, "Query log unavailable; runs will not be recorded");
            None
        }
    };

    let state = AppState { pipeline, audit };
    let listener = TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!(addr = %cfg.bind_addr, "geoquery API online");

    axum::serve(listener, router(state, &cfg.cors_allowed_origins)).await?;
    Ok(())
}

async fn ask(
    cfg: ServiceConfig,
    catalog: Arc<SchemaCatalog>,
    text: &str,
    map: Option<SpatialContext>,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = build_pipeline(&cfg, catalog)?;

    // Ctrl-C abandons the LLM call or statement instead of killing the
    // process mid-transaction.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let rendered = match map {
        Some(spatial) => pipeline
            .run_map_query(text, &spatial, &cancel)
            .await
            .map(|out| serde_json::to_string_pretty(&dto::MapQueryResponse::from(out))),
        None => pipeline
            .run_query(text, &cancel)
            .await
            .map(|out| serde_json::to_string_pretty(&dto::QueryResponse::from(out))),
    };

    match rendered {
        Ok(json) => println!("{}", json?),
        Err(failed) => {
            eprintln!("{} [{}]", failed.error, failed.error.error_code());
            if let geoquery::pipeline::PipelineError::InvalidSql { sql, .. } = &failed.error {
                eprintln!("candidate SQL: {sql}");
            }
            std::process::exit(1);
        }
    }
    Ok(())
}
