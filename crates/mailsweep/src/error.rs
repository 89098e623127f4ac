//! Mapping of core errors onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mailsweep_core::Error;
use serde::Serialize;
use tracing::{error, warn};

/// Error returned by request handlers.
#[derive(Debug)]
pub enum AppError {
    /// An error from the core library.
    Core(Error),
    /// A malformed request the core never saw.
    BadRequest(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Core(Error::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Core(Error::AlreadyInProgress(_)) => StatusCode::CONFLICT,
            Self::Core(Error::AuthExpired | Error::NotSignedIn) => StatusCode::UNAUTHORIZED,
            Self::Core(Error::AccountNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Core(Error::Transport(_)) => StatusCode::BAD_GATEWAY,
            Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadRequest(message) => ErrorBody {
                error: message,
                field: None,
            },
            Self::Core(Error::Validation(v)) => ErrorBody {
                error: v.message().to_string(),
                field: Some(v.field()),
            },
            Self::Core(e) => {
                if status.is_server_error() {
                    error!("Request failed: {e}");
                } else {
                    warn!("Request rejected: {e}");
                }
                ErrorBody {
                    error: e.to_string(),
                    field: None,
                }
            }
        };
        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        Self::Core(err.into())
    }
}
