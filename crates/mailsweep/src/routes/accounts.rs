//! Accounts and browser sign-in.
//!
//! Switching or losing the active account resets every operation state, so
//! results of one mailbox are never acted on in another. While an operation
//! runs the active account cannot change.

use axum::Json;
use axum::extract::{Query, State};
use mailsweep_core::{AccountList, Error};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::AppState;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct AccountRequest {
    email: String,
}

#[derive(Debug, Serialize)]
pub struct ActiveAccount {
    active: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignInUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Rejects an account change while any operation is in flight.
fn ensure_idle(app: &AppState) -> Result<(), AppError> {
    match app.states.busy_kind() {
        Some(kind) => Err(Error::AlreadyInProgress(kind).into()),
        None => Ok(()),
    }
}

pub async fn list(State(app): State<AppState>) -> Json<AccountList> {
    Json(app.credentials.accounts().list().await)
}

pub async fn switch(
    State(app): State<AppState>,
    Json(request): Json<AccountRequest>,
) -> Result<Json<AccountList>, AppError> {
    ensure_idle(&app)?;
    let accounts = app.credentials.accounts();
    accounts.switch(&request.email).await?;
    app.states.clear_all();
    info!(email = %request.email, "Switched account");
    Ok(Json(accounts.list().await))
}

pub async fn remove(
    State(app): State<AppState>,
    Json(request): Json<AccountRequest>,
) -> Result<Json<ActiveAccount>, AppError> {
    ensure_idle(&app)?;
    let previous = app.credentials.accounts().active().await;
    let active = app.credentials.remove_account(&request.email).await?;
    if active != previous {
        app.states.clear_all();
    }
    Ok(Json(ActiveAccount { active }))
}

pub async fn sign_out(State(app): State<AppState>) -> Result<Json<ActiveAccount>, AppError> {
    ensure_idle(&app)?;
    let active = app.credentials.sign_out().await?;
    app.states.clear_all();
    Ok(Json(ActiveAccount { active }))
}

pub async fn sign_in(State(app): State<AppState>) -> Result<Json<SignInUrl>, AppError> {
    let url = app.credentials.authorization_url().await?;
    Ok(Json(SignInUrl { url }))
}

pub async fn callback(
    State(app): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<String, AppError> {
    if let Some(error) = query.error {
        return Err(AppError::BadRequest(format!("Sign-in was cancelled: {error}")));
    }
    let (Some(code), Some(state)) = (query.code, query.state) else {
        return Err(AppError::BadRequest("Missing code or state".to_string()));
    };
    ensure_idle(&app)?;
    let email = app.credentials.complete_sign_in(&code, &state).await?;
    app.states.clear_all();
    info!(%email, "Signed in");
    Ok(format!("Signed in as {email}. You can close this window."))
}
