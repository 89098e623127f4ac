//! Token endpoint client and the authorization code flow.

mod code;
mod pkce;

pub use code::AuthorizationCodeFlow;
pub use pkce::PkceChallenge;

use reqwest::Client;

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::token::{ErrorResponse, Token, TokenResponse};

/// Registered Google client plus the endpoints it talks to.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client ID from the Google Cloud console.
    pub client_id: String,
    /// Client secret (installed-app secrets are not confidential).
    pub client_secret: Option<String>,
    /// Redirect URI registered for the client.
    pub redirect_uri: Option<String>,
    /// Provider configuration.
    pub provider: Provider,
    http_client: Client,
}

impl OAuthClient {
    /// Creates a new OAuth client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: None,
            provider,
            http_client: Client::new(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Obtains a fresh access token.
    ///
    /// The refresh token is carried over when Google does not rotate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRefreshToken`] if `token` cannot be refreshed, or
    /// the endpoint's error (`invalid_grant` once the grant is revoked).
    pub async fn refresh_token(&self, token: &Token) -> Result<Token> {
        let refresh_token = token.refresh_token()?;
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.push_client_auth(&mut params);

        let response = self.request_token(&params).await?;
        let mut refreshed = Token::from_response(response);
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token.clone_from(&token.refresh_token);
        }
        tracing::debug!(expires_at = ?refreshed.expires_at, "Access token refreshed");
        Ok(refreshed)
    }

    pub(crate) async fn exchange_code(&self, code: &str, code_verifier: Option<&str>) -> Result<Token> {
        let mut params = vec![("grant_type", "authorization_code"), ("code", code)];
        if let Some(uri) = self.redirect_uri.as_deref() {
            params.push(("redirect_uri", uri));
        }
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }
        self.push_client_auth(&mut params);

        let response = self.request_token(&params).await?;
        Ok(Token::from_response(response))
    }

    fn push_client_auth<'a>(&'a self, params: &mut Vec<(&'static str, &'a str)>) {
        params.push(("client_id", &self.client_id));
        if let Some(secret) = self.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        if self.client_id.trim().is_empty() {
            return Err(Error::InvalidConfig("client_id is empty".into()));
        }
        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(params)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(serde_json::from_str::<ErrorResponse>(&body).map_or_else(
                |_| Error::InvalidResponse(format!("token endpoint returned {status}")),
                Error::from,
            ));
        }
        serde_json::from_str(&body).map_err(|e| Error::InvalidResponse(e.to_string()))
    }
}
