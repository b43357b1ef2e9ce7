mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use grader_common::GraderConfig;
use grader_engine::{Grader, LanguageConfigManager, Sandbox};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState {
    pub grader: Grader<Sandbox>,
    pub config: GraderConfig,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();
    info!("Grader API booting...");

    metrics::init_metrics();
    info!("Metrics registry initialized");

    let config = GraderConfig::from_env().context("Invalid configuration")?;
    let languages = LanguageConfigManager::load_or_builtin(Path::new(&config.language_config_path))
        .context("Failed to load language configuration")?;
    info!(
        languages = ?languages.list_languages(),
        "Loaded language configuration"
    );

    let sandbox = Sandbox::from_config(&config, languages)?;
    info!(
        backend = %sandbox.backend(),
        time_limit_ms = config.time_limit_ms,
        max_concurrent_cases = config.max_concurrent_cases,
        "Sandbox ready"
    );

    let addr = config.bind_addr.clone();
    let state = Arc::new(AppState {
        grader: Grader::new(sandbox, config.max_concurrent_cases),
        config,
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);
    info!("Ready to grade submissions");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
