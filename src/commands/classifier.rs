use crate::commands::pages;
use crate::error::AppError;
use crate::models::classify_types::{BatchReport, ModelStatus, SingleReport};
use crate::models::upload_types::UploadedImage;
use crate::services::format_service::CSV_FILE_NAME;
use crate::AppState;
use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use tracing::info;

/// Collects every non-empty `file`/`files` field in upload order.
async fn read_uploads(mut multipart: Multipart) -> Result<Vec<UploadedImage>, AppError> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name != "file" && name != "files" {
            continue;
        }
        let file_name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("image-{}", uploads.len() + 1));
        let bytes = field.bytes().await?;
        // An untouched file input still submits an empty part
        if bytes.is_empty() {
            continue;
        }
        info!(file = %file_name, bytes = bytes.len(), "upload received");
        uploads.push(UploadedImage::new(file_name, bytes.to_vec()));
    }
    Ok(uploads)
}

async fn run_blocking<T, F>(job: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| AppError::Inference(format!("Task join failed: {}", e)))?
}

async fn single_report(state: &AppState, multipart: Multipart) -> Result<Option<SingleReport>, AppError> {
    let mut uploads = read_uploads(multipart).await?;
    if uploads.is_empty() {
        return Ok(None);
    }
    let upload = uploads.swap_remove(0);
    let pipeline = state.pipeline.clone();
    run_blocking(move || pipeline.classify_single(&upload)).await.map(Some)
}

async fn batch_report(state: &AppState, multipart: Multipart) -> Result<Option<BatchReport>, AppError> {
    let uploads = read_uploads(multipart).await?;
    if uploads.is_empty() {
        return Ok(None);
    }
    let pipeline = state.pipeline.clone();
    run_blocking(move || pipeline.classify_batch(&uploads)).await.map(Some)
}

pub async fn single_form() -> Html<String> {
    Html(pages::single_page(None, None))
}

pub async fn batch_form(State(state): State<AppState>) -> Html<String> {
    Html(pages::batch_page(None, None, state.pipeline.max_batch_size()))
}

pub async fn single_upload(State(state): State<AppState>, multipart: Multipart) -> Response {
    match single_report(&state, multipart).await {
        Ok(report) => Html(pages::single_page(report.as_ref(), None)).into_response(),
        Err(e) => (e.status(), Html(pages::single_page(None, Some(&e.to_string())))).into_response(),
    }
}

pub async fn batch_upload(State(state): State<AppState>, multipart: Multipart) -> Response {
    let max = state.pipeline.max_batch_size();
    match batch_report(&state, multipart).await {
        Ok(report) => Html(pages::batch_page(report.as_ref(), None, max)).into_response(),
        Err(e) => (e.status(), Html(pages::batch_page(None, Some(&e.to_string()), max))).into_response(),
    }
}

pub async fn classify_images(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<SingleReport>, AppError> {
    single_report(&state, multipart)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::Upload("no file uploaded".to_string()))
}

pub async fn classify_batch(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<BatchReport>, AppError> {
    batch_report(&state, multipart)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::Upload("no files uploaded".to_string()))
}

pub async fn export_csv(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    let report = batch_report(&state, multipart)
        .await?
        .ok_or_else(|| AppError::Upload("no files uploaded".to_string()))?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", CSV_FILE_NAME),
            ),
        ],
        report.csv,
    )
        .into_response())
}

pub async fn get_model_status(State(state): State<AppState>) -> Json<ModelStatus> {
    Json(state.pipeline.classifier().status())
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}
