//! Error types for the Gmail client.

use thiserror::Error;

/// Errors that fail a whole Gmail call.
///
/// Individual items of a batch never surface here; they are delivered to the
/// caller's per-item callback as [`ItemFailure`](crate::ItemFailure).
#[derive(Debug, Error)]
pub enum Error {
    /// Network-level failure (connect, TLS, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A response body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The access token was rejected; the user has to sign in again.
    #[error("Authentication expired")]
    AuthExpired,

    /// The API answered the call itself with a non-success status.
    #[error("Gmail API returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// More item IDs than one physical batch request may carry.
    #[error("Batch of {size} items exceeds the limit of {max}")]
    BatchTooLarge {
        /// Number of IDs submitted.
        size: usize,
        /// Maximum allowed per call.
        max: usize,
    },

    /// The batch response could not be split into parts.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The token source failed for a reason other than expired credentials.
    #[error("Credential error: {0}")]
    Credentials(String),

    /// The configured endpoint is not a usable URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl Error {
    /// Returns `true` when the failure means the credentials are stale.
    #[must_use]
    pub const fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }

    /// Builds an error from a non-success status and its raw body.
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        if status == 401 {
            return Self::AuthExpired;
        }
        Self::Api {
            status,
            message: extract_error_message(body),
        }
    }
}

/// Pulls `error.message` out of a Google API error body, falling back to a
/// truncated copy of the raw text.
pub(crate) fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| body.trim().chars().take(200).collect())
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
