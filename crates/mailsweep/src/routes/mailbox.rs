//! Unsubscribe, labels, preview, search and export.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;
use mailsweep_core::{
    LabelUnsubscribeReport, MessagePreview, SearchResults, UnsubscribeResult, export_by_query,
    export_threads, labels, preview_sender, process_unsubscribe_label, search_threads,
};
use mailsweep_gmail::Label;
use serde::Deserialize;

use crate::app::AppState;
use crate::error::AppError;

const DEFAULT_UNSUBSCRIBE_LABEL: &str = "Unsubscribe";

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    #[serde(default)]
    link: String,
}

#[derive(Debug, Deserialize)]
pub struct LabelRequest {
    #[serde(default)]
    label_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLabelRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    sender: String,
    #[serde(default = "default_preview_limit")]
    limit: usize,
}

const fn default_preview_limit() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    query: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

const fn default_max_results() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct ExportSelectedRequest {
    #[serde(default)]
    thread_ids: Vec<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQueryRequest {
    #[serde(default)]
    query: String,
    #[serde(default = "default_max_threads")]
    max_threads: usize,
}

const fn default_max_threads() -> usize {
    100
}

pub async fn unsubscribe(
    State(app): State<AppState>,
    Json(request): Json<UnsubscribeRequest>,
) -> Result<Json<UnsubscribeResult>, AppError> {
    Ok(Json(app.unsubscriber.unsubscribe(&request.link).await?))
}

pub async fn process_label(
    State(app): State<AppState>,
    Json(request): Json<LabelRequest>,
) -> Result<Json<LabelUnsubscribeReport>, AppError> {
    let client = app.gmail().await?;
    let name = request
        .label_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_UNSUBSCRIBE_LABEL.to_string());
    let report = process_unsubscribe_label(&client, &app.unsubscriber, &name, app.batch_size).await?;
    Ok(Json(report))
}

pub async fn list_labels(State(app): State<AppState>) -> Result<Json<Vec<Label>>, AppError> {
    let client = app.gmail().await?;
    Ok(Json(labels::list_labels(&client).await?))
}

pub async fn create_label(
    State(app): State<AppState>,
    Json(request): Json<CreateLabelRequest>,
) -> Result<(StatusCode, Json<Label>), AppError> {
    let client = app.gmail().await?;
    let label = labels::create_label(&client, &request.name).await?;
    Ok((StatusCode::CREATED, Json(label)))
}

pub async fn delete_label(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let client = app.gmail().await?;
    labels::delete_label(&client, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn preview(
    State(app): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<Vec<MessagePreview>>, AppError> {
    let client = app.gmail().await?;
    Ok(Json(preview_sender(&client, &query.sender, query.limit).await?))
}

pub async fn search(
    State(app): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResults>, AppError> {
    let client = app.gmail().await?;
    Ok(Json(search_threads(&client, &request.query, request.max_results).await?))
}

pub async fn export_selected(
    State(app): State<AppState>,
    Json(request): Json<ExportSelectedRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client = app.gmail().await?;
    let title = request.title.unwrap_or_else(|| "Selected threads".to_string());
    let text = export_threads(&client, &request.thread_ids, &title).await?;
    Ok(attachment(text))
}

pub async fn export_query(
    State(app): State<AppState>,
    Json(request): Json<ExportQueryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client = app.gmail().await?;
    let text = export_by_query(
        &client,
        &request.query,
        request.max_threads,
        app.max_export_threads,
    )
    .await?;
    Ok(attachment(text))
}

fn attachment(text: String) -> impl IntoResponse {
    let filename = format!(
        "attachment; filename=\"gmail_export_{}.txt\"",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    (
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (CONTENT_DISPOSITION, filename),
        ],
        text,
    )
}
