pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use config::AppConfig;
use services::classifier::model_manager;
use services::classifier::Classifier;
use services::pipeline::Pipeline;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

pub fn router(pipeline: Pipeline, body_limit_bytes: usize) -> Router {
    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    Router::new()
        .route(
            "/",
            get(commands::classifier::single_form).post(commands::classifier::single_upload),
        )
        .route(
            "/batch",
            get(commands::classifier::batch_form).post(commands::classifier::batch_upload),
        )
        .route("/api/classify", post(commands::classifier::classify_images))
        .route("/api/batch", post(commands::classifier::classify_batch))
        .route("/api/batch/csv", post(commands::classifier::export_csv))
        .route("/api/model", get(commands::classifier::get_model_status))
        .route("/health", get(commands::classifier::health_check))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(state)
}

/// Loads the model, then serves until ctrl-c.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let model_config = config.model.clone();
    let model = tokio::task::spawn_blocking(move || model_manager::load_model(&model_config))
        .await??;
    let classifier: Arc<dyn Classifier> = Arc::new(model);

    let pipeline = Pipeline::new(classifier, &config);
    let app = router(pipeline, config.server.body_limit_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(address = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
