//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, GuardedFetcher, OpenAiGenerationAdapter, SearchGenerationAdapter},
    config::Config,
    error::ApiError,
    pipeline::Pipeline,
    web::{self, AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use blog_pipeline_core::{gateway::ProviderGateway, rate_limit::RateLimiter};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Search calls run long; research replies are large.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Provider Adapters ---
    let mut openai_config = OpenAIConfig::new().with_api_key(config.openai_api_key.clone());
    if let Some(api_base) = &config.openai_api_base {
        openai_config = openai_config.with_api_base(api_base.clone());
    }
    let generation_adapter = Arc::new(OpenAiGenerationAdapter::new(
        Client::with_config(openai_config),
        config.generation_model.clone(),
        config.light_model.clone(),
    ));

    let search_client = reqwest::Client::builder()
        .timeout(SEARCH_TIMEOUT)
        .build()
        .map_err(|e| ApiError::Internal(format!("Failed to build search client: {}", e)))?;
    let search_adapter = Arc::new(SearchGenerationAdapter::new(
        search_client,
        &config.search_api_base,
        config.search_api_key.clone(),
        config.search_model.clone(),
    ));

    let fetcher = Arc::new(
        GuardedFetcher::new(config.fetch_timeout)
            .map_err(|e| ApiError::Internal(format!("Failed to build page fetcher: {}", e)))?,
    );

    // --- 4. Build the Shared AppState ---
    let pipeline = Pipeline::new(
        db_adapter.clone(),
        ProviderGateway::new(generation_adapter),
        ProviderGateway::new(search_adapter),
        fetcher,
    );
    let app_state = Arc::new(AppState {
        pipeline,
        limiter: RateLimiter::new(db_adapter.clone()),
        store: db_adapter,
        config: config.clone(),
    });

    // --- 5. Create the Web Router ---
    let app = web::router(app_state);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
