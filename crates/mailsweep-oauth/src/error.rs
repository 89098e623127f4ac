//! Error types for sign-in and token refresh.

/// Result type alias for `OAuth2` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `OAuth2` error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The token endpoint rejected the request.
    #[error("OAuth2 error: {error} - {description}")]
    OAuth {
        /// Error code (e.g., `invalid_grant`).
        error: String,
        /// Human-readable description.
        description: String,
    },

    /// The stored token carries no refresh token.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The token endpoint answered with something that is not a token.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// The user declined the consent screen.
    #[error("User denied authorization")]
    AccessDenied,

    /// The callback `state` does not match the pending sign-in.
    #[error("Authorization state mismatch")]
    StateMismatch,

    /// Missing client ID or similar.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Creates an OAuth error from error code and description.
    #[must_use]
    pub fn oauth_error(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::OAuth {
            error: error.into(),
            description: description.into(),
        }
    }

    /// Returns `true` when the grant is revoked or expired and only a new
    /// sign-in can recover.
    #[must_use]
    pub fn requires_sign_in(&self) -> bool {
        match self {
            Self::OAuth { error, .. } => error == "invalid_grant" || error == "unauthorized_client",
            Self::NoRefreshToken | Self::AccessDenied => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_grant_requires_sign_in() {
        assert!(Error::oauth_error("invalid_grant", "Token has been expired or revoked.").requires_sign_in());
        assert!(Error::NoRefreshToken.requires_sign_in());
        assert!(!Error::oauth_error("temporarily_unavailable", "").requires_sign_in());
        assert!(!Error::InvalidResponse("x".into()).requires_sign_in());
    }
}
