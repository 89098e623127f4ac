//! # mailsweep-oauth
//!
//! Google `OAuth2` for a local Gmail web app.
//!
//! - **Authorization code flow** with PKCE and a CSRF `state`
//! - **Token refresh**, keeping the refresh token when Google does not rotate it
//! - **Gmail scopes** limited to modify and labels; no full-mailbox scope
//!
//! ```ignore
//! use mailsweep_oauth::{AuthorizationCodeFlow, OAuthClient, Provider};
//!
//! let client = OAuthClient::new(client_id, Provider::google()?)
//!     .with_redirect_uri("http://127.0.0.1:8766/oauth/callback");
//! let flow = AuthorizationCodeFlow::new(client.clone());
//! let url = flow.authorization_url(None);
//!
//! // after the browser redirects back with ?code=..&state=..
//! let token = flow.complete(&code, &state).await?;
//!
//! if token.is_expired() {
//!     let token = client.refresh_token(&token).await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod provider;
pub mod token;

pub use error::{Error, Result};
pub use flow::{AuthorizationCodeFlow, OAuthClient, PkceChallenge};
pub use provider::{GMAIL_LABELS_SCOPE, GMAIL_MODIFY_SCOPE, Provider};
pub use token::Token;
