//! Authorization server endpoints.

use url::Url;

use crate::error::Result;

/// Scope allowing read, label and trash operations (no permanent delete).
pub const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Scope allowing label creation and deletion.
pub const GMAIL_LABELS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.labels";

/// `OAuth2` provider configuration.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Display name.
    pub name: String,
    /// Authorization endpoint URL.
    pub auth_url: Url,
    /// Token endpoint URL.
    pub token_url: Url,
    /// Scopes requested when the caller gives none.
    pub default_scopes: Vec<String>,
    /// Extra query parameters appended to the authorization URL.
    pub extra_auth_params: Vec<(String, String)>,
}

impl Provider {
    /// Creates a provider with no default scopes.
    ///
    /// # Errors
    ///
    /// Returns an error if either URL is invalid.
    pub fn new(
        name: impl Into<String>,
        auth_url: impl AsRef<str>,
        token_url: impl AsRef<str>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            auth_url: Url::parse(auth_url.as_ref())?,
            token_url: Url::parse(token_url.as_ref())?,
            default_scopes: Vec::new(),
            extra_auth_params: Vec::new(),
        })
    }

    /// Google with the Gmail scopes mailsweep needs.
    ///
    /// Requests offline access and forces the consent prompt so that a
    /// refresh token is issued on every sign-in.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn google() -> Result<Self> {
        let mut provider = Self::new(
            "Google",
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
        )?;
        provider.default_scopes = vec![
            GMAIL_MODIFY_SCOPE.to_string(),
            GMAIL_LABELS_SCOPE.to_string(),
        ];
        provider.extra_auth_params = vec![
            ("access_type".to_string(), "offline".to_string()),
            ("prompt".to_string(), "consent".to_string()),
        ];
        Ok(provider)
    }

    /// Replaces the token endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn with_token_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.token_url = Url::parse(url.as_ref())?;
        Ok(self)
    }
}
