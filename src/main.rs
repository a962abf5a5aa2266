use axum::http::HeaderValue;
use axum::{routing::{get, post}, Router};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use csv_api_router::api::{self, AppState};
use csv_api_router::config::Config;
use csv_api_router::constants::API_VERSION;
use csv_api_router::integrations::load_csv_path;
use csv_api_router::services::{choose_strategy, CancelToken};

#[derive(Parser)]
#[command(about = "Maps CSV transaction rows onto typed API calls and dispatches them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a CSV file once and write the run report as JSON.
    Run {
        #[arg(short, long)]
        input: PathBuf,

        /// Free-text instruction, e.g. "tag these as expenses, chain is ETH".
        #[arg(long)]
        instruction: Option<String>,

        /// Overrides CONCURRENCY_LIMIT.
        #[arg(short, long)]
        workers: Option<usize>,

        /// Overrides RETRY_MAX_ATTEMPTS (1 disables retries).
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Build descriptors without dispatching them.
        #[arg(long)]
        prepare_only: bool,

        /// Report destination; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "csv_api_router=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Run {
            input,
            instruction,
            workers,
            max_attempts,
            prepare_only,
            output,
        } => {
            if let Some(workers) = workers {
                config.concurrency_limit = workers;
            }
            if let Some(max_attempts) = max_attempts {
                config.retry_max_attempts = max_attempts;
            }
            config.validate()?;
            run_batch(&config, input, instruction, prepare_only, output).await
        }
        Commands::Serve => {
            config.validate()?;
            serve(config).await
        }
    }
}

async fn run_batch(
    config: &Config,
    input: PathBuf,
    instruction: Option<String>,
    prepare_only: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    let loaded = load_csv_path(&input)?;

    let choice = choose_strategy(
        Some(state.oracle.as_ref()),
        instruction.as_deref(),
        &loaded.headers,
    )
    .await;

    let json = if prepare_only {
        let prepared = state.pipeline.prepare(&loaded.rows, choice.strategy.as_ref());
        serde_json::to_string_pretty(&prepared)?
    } else {
        let cancel = CancelToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received; no further items will be admitted");
                on_signal.cancel();
            }
        });

        let report = state
            .pipeline
            .run(&loaded.rows, choice, &state.executor, cancel)
            .await;
        for warning in &report.warnings {
            tracing::warn!("{}", warning);
        }
        tracing::info!(
            "Run complete: {} rows, {} success, {} failed, {} skipped, {} unclassified, {} invalid",
            report.total_rows,
            report.summary.totals.success,
            report.summary.totals.failed,
            report.summary.totals.skipped,
            report.unclassified,
            report.invalid
        );
        serde_json::to_string_pretty(&report)?
    };

    match output {
        Some(path) => {
            std::fs::write(&path, json)?;
            tracing::info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting CSV API router");
    tracing::info!("API Version: {}", API_VERSION);

    let state = AppState::from_config(&config)?;
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    let cors = cors_from_config(&state.config);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Processing
        .route("/api/v1/process", post(api::process::process_rows))
        .route("/api/v1/chains", get(api::chains::list_chains))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
