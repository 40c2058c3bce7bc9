use tracing_subscriber::EnvFilter;

use repo_qa::api;
use repo_qa::config::Config;
use repo_qa::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!(
        "LLM provider: {} ({})",
        config.llm.primary.provider,
        config.llm.primary.base_url
    );
    if let Some(fallback) = &config.llm.fallback {
        tracing::info!("Fallback provider: {} ({})", fallback.provider, fallback.base_url);
    }
    if config.github.token.is_none() {
        tracing::info!(
            "No GITHUB_TOKEN set: public repositories only, archives up to {} MB",
            config.github.max_archive_mb
        );
    }

    let state = AppState::new(config.clone())?;
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
