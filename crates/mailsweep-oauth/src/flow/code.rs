//! Authorization code flow with PKCE and a CSRF `state`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use url::Url;

use super::{OAuthClient, PkceChallenge};
use crate::error::{Error, Result};
use crate::token::Token;

/// One pending browser sign-in.
///
/// Build the consent URL with [`authorization_url`](Self::authorization_url),
/// then finish with [`complete`](Self::complete) once the redirect arrives.
#[derive(Debug, Clone)]
pub struct AuthorizationCodeFlow {
    client: OAuthClient,
    pkce: PkceChallenge,
    state: String,
}

impl AuthorizationCodeFlow {
    /// Starts a flow with a fresh PKCE verifier and state.
    #[must_use]
    pub fn new(client: OAuthClient) -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            client,
            pkce: PkceChallenge::generate(),
            state: URL_SAFE_NO_PAD.encode(bytes),
        }
    }

    /// Returns the `state` value the callback must echo.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Builds the consent screen URL.
    ///
    /// `scopes` overrides the provider's default scopes.
    #[must_use]
    pub fn authorization_url(&self, scopes: Option<&[String]>) -> Url {
        let mut url = self.client.provider.auth_url.clone();
        let scope = scopes.map_or_else(
            || self.client.provider.default_scopes.join(" "),
            |s| s.join(" "),
        );
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", &self.client.client_id)
                .append_pair("response_type", "code")
                .append_pair("state", &self.state)
                .append_pair("code_challenge", self.pkce.challenge())
                .append_pair("code_challenge_method", self.pkce.method());
            if let Some(redirect_uri) = &self.client.redirect_uri {
                pairs.append_pair("redirect_uri", redirect_uri);
            }
            if !scope.is_empty() {
                pairs.append_pair("scope", &scope);
            }
            for (key, value) in &self.client.provider.extra_auth_params {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    /// Verifies the returned state and exchanges the code for a token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StateMismatch`] for a foreign callback, or the token
    /// endpoint's error.
    pub async fn complete(&self, code: &str, state: &str) -> Result<Token> {
        if state != self.state {
            return Err(Error::StateMismatch);
        }
        self.client
            .exchange_code(code, Some(self.pkce.verifier()))
            .await
    }
}
