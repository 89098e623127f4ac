//! Error types for the core library.

use thiserror::Error;

use crate::state::OperationKind;
use crate::validation::ValidationError;

/// Errors that terminate a core operation.
///
/// Per-item failures inside a batch are never represented here; they are
/// counted in the operation's `failed_count`.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation of this kind is already running.
    #[error("A {0} operation is already in progress")]
    AlreadyInProgress(OperationKind),

    /// Google rejected the credentials; the user has to sign in again.
    #[error("Authentication expired, please sign in again")]
    AuthExpired,

    /// A whole remote call failed (network, timeout, API error).
    #[error("Gmail request failed: {0}")]
    Transport(String),

    /// Input rejected before any network call.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// No account is signed in.
    #[error("Not signed in")]
    NotSignedIn,

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Credential storage error.
    #[error("Credential error: {0}")]
    Credential(#[from] keyring::Error),

    /// Sign-in or token refresh failed.
    #[error("OAuth error: {0}")]
    OAuth(#[from] mailsweep_oauth::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<mailsweep_gmail::Error> for Error {
    fn from(err: mailsweep_gmail::Error) -> Self {
        if err.is_auth_expired() {
            Self::AuthExpired
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_errors_map_to_taxonomy() {
        assert!(matches!(
            Error::from(mailsweep_gmail::Error::AuthExpired),
            Error::AuthExpired
        ));
        let err = Error::from(mailsweep_gmail::Error::Api {
            status: 500,
            message: "Backend Error".into(),
        });
        assert!(matches!(err, Error::Transport(ref m) if m.contains("Backend Error")));
    }

    #[test]
    fn test_already_in_progress_names_kind() {
        let err = Error::AlreadyInProgress(OperationKind::DeleteScan);
        assert_eq!(err.to_string(), "A delete-scan operation is already in progress");
    }
}
