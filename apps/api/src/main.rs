mod compiler;
mod config;
mod errors;
mod llm_client;
mod optimizer;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::compiler::{DocumentCompiler, PdfLatex};
use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::optimizer::{LoopPolicy, Optimizer};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume Optimizer API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize compiler adapter and report availability
    let pdflatex = PdfLatex::from_config(&config);
    let pdflatex_ok = pdflatex.probe().await.is_some();
    info!("pdflatex available: {pdflatex_ok}");
    let compiler: Arc<dyn DocumentCompiler> = Arc::new(pdflatex);

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone(), &config.anthropic_base_url)?;
    info!(
        "LLM client initialized (model: {}, api key set: {})",
        llm_client::MODEL,
        !config.anthropic_api_key.trim().is_empty()
    );

    let policy = LoopPolicy {
        budget: config.optimize_budget,
        ..LoopPolicy::default()
    };
    info!(
        max_fix_attempts = policy.max_fix_attempts,
        max_shrink_attempts = policy.max_shrink_attempts,
        budget_secs = policy.budget.map(|b| b.as_secs()),
        "Convergence loop policy"
    );
    let optimizer = Optimizer::new(
        Arc::new(llm),
        compiler.clone(),
        config.system_prompt.clone(),
        policy,
    );

    // Build app state
    let state = AppState {
        optimizer: Arc::new(optimizer),
        compiler,
    };

    // Build router
    let app = build_router(state, &config.static_dir).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
