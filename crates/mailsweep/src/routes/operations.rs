//! Scans, bulk actions and their status.
//!
//! Long operations claim their busy flag inside the request, so a second
//! start is answered with 409, and then continue on a spawned task. Clients
//! poll `/api/status/{kind}`.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use mailsweep_core::{
    Action, ActionExecutor, ActionOutcome, FilterConfig, OperationKind, ScanLimit,
    SenderGroup, StatusSnapshot, ValidationError, unread_count,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::AppError;

/// Body of scan and mark-read requests.
#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    #[serde(flatten)]
    filter: FilterConfig,
    #[serde(default)]
    limit: Option<usize>,
}

/// Body of `/api/actions/{action}`.
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    senders: Vec<String>,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Started {
    kind: OperationKind,
    started: bool,
}

impl Started {
    fn accepted(kind: OperationKind) -> (StatusCode, Json<Self>) {
        info!(%kind, "Operation started");
        (StatusCode::ACCEPTED, Json(Self { kind, started: true }))
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    status: StatusSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<ActionOutcome>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    count: u32,
}

fn parse_kind(kind: &str) -> Result<OperationKind, AppError> {
    Ok(kind.parse::<OperationKind>()?)
}

pub async fn unsubscribe_scan(
    State(app): State<AppState>,
    Json(request): Json<FilterRequest>,
) -> Result<(StatusCode, Json<Started>), AppError> {
    start_scan(app, OperationKind::UnsubscribeScan, request).await
}

pub async fn delete_scan(
    State(app): State<AppState>,
    Json(request): Json<FilterRequest>,
) -> Result<(StatusCode, Json<Started>), AppError> {
    start_scan(app, OperationKind::DeleteScan, request).await
}

async fn start_scan(
    app: AppState,
    kind: OperationKind,
    request: FilterRequest,
) -> Result<(StatusCode, Json<Started>), AppError> {
    let client = app.gmail().await?;
    let guard = app.scanner.begin(&app.states, kind, &request.filter)?;
    let scanner = app.scanner;
    tokio::spawn(async move {
        let limit = ScanLimit::from_option(request.limit);
        if let Err(e) = scanner.run(&client, guard, &request.filter, limit).await {
            warn!(%kind, "Scan aborted: {e}");
        }
    });
    Ok(Started::accepted(kind))
}

pub async fn status(
    State(app): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let kind = parse_kind(&kind)?;
    let state = app.states.get(kind);
    Ok(Json(StatusResponse {
        status: state.status(),
        outcome: state.last_outcome(),
    }))
}

pub async fn results(
    State(app): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<Vec<SenderGroup>>, AppError> {
    let kind = parse_kind(&kind)?;
    if !kind.is_scan() {
        return Err(ValidationError::WrongOperation.into());
    }
    Ok(Json(app.states.results(kind).as_ref().clone()))
}

pub async fn run_action(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ActionRequest>,
) -> Result<(StatusCode, Json<Started>), AppError> {
    let action = Action::from_name(&name, request.label)?;
    let client = app.gmail().await?;
    let guard = app.executor.begin(&app.states, &action, &request.senders)?;
    let groups = app.scanned_groups();
    let kind = action.kind();
    let executor = app.executor;
    tokio::spawn(async move {
        if let Err(e) = executor
            .run(&client, guard, &action, &request.senders, &groups)
            .await
        {
            warn!(%kind, "Action aborted: {e}");
        }
    });
    Ok(Started::accepted(kind))
}

pub async fn mark_read_matching(
    State(app): State<AppState>,
    Json(request): Json<FilterRequest>,
) -> Result<(StatusCode, Json<Started>), AppError> {
    let client = app.gmail().await?;
    let guard = ActionExecutor::begin_mark_read(&app.states, &request.filter)?;
    let executor = app.executor;
    tokio::spawn(async move {
        if let Err(e) = executor
            .run_mark_read(&client, guard, &request.filter, request.limit)
            .await
        {
            warn!("Mark read aborted: {e}");
        }
    });
    Ok(Started::accepted(OperationKind::MarkRead))
}

pub async fn unread(State(app): State<AppState>) -> Result<Json<UnreadCount>, AppError> {
    let client = app.gmail().await?;
    let count = unread_count(&client).await?;
    Ok(Json(UnreadCount { count }))
}
