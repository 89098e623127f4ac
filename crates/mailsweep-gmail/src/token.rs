//! Bearer token sources.
//!
//! The client asks its source for a token before every call, so a long run
//! picks up a refreshed token as soon as one exists. When the API still
//! answers 401 the client asks for a renewal once and resends.

use std::fmt;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Supplies the access token sent with each request.
#[async_trait]
pub trait AccessTokenSource: Send + Sync + fmt::Debug {
    /// Returns the token to send now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthExpired`] when the user has to sign in again.
    async fn access_token(&self) -> Result<String>;

    /// Returns a replacement for `rejected`, which the API refused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthExpired`] when no replacement can be obtained.
    async fn renew(&self, rejected: &str) -> Result<String>;
}

/// A token that cannot be renewed.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wraps a raw access token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken([redacted])")
    }
}

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }

    async fn renew(&self, _rejected: &str) -> Result<String> {
        Err(Error::AuthExpired)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_never_renews() {
        let source = StaticToken::new("abc");
        assert_eq!(source.access_token().await.unwrap(), "abc");
        assert!(source.renew("abc").await.unwrap_err().is_auth_expired());
        assert!(!format!("{source:?}").contains("abc"));
    }
}
