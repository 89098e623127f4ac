//! Token storage and the credential provider.
//!
//! Tokens are kept per account in the platform keyring:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use keyring::Entry;
use mailsweep_gmail::{AccessTokenSource, Config as GmailConfig, Gateway, GmailClient};
use mailsweep_oauth::{AuthorizationCodeFlow, OAuthClient, Token};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::accounts::AccountRegistry;
use crate::error::{Error, Result};

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "mailsweep";

/// Where OAuth tokens are persisted, keyed by account address.
pub trait TokenStore: Send + Sync {
    /// Loads the token of `email`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load(&self, email: &str) -> Result<Option<Token>>;

    /// Stores or replaces the token of `email`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn store(&self, email: &str, token: &Token) -> Result<()>;

    /// Deletes the token of `email`; missing entries are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn delete(&self, email: &str) -> Result<()>;
}

/// Token store backed by the system keyring.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyringTokenStore;

impl KeyringTokenStore {
    fn entry(email: &str) -> Result<Entry> {
        let key = format!("{SERVICE_NAME}_oauth_token_{}", email.to_lowercase());
        Ok(Entry::new(SERVICE_NAME, &key)?)
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self, email: &str) -> Result<Option<Token>> {
        match Self::entry(email)?.get_password() {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(keyring::Error::NoEntry) => {
                debug!(%email, "No OAuth token in keyring");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, email: &str, token: &Token) -> Result<()> {
        Self::entry(email)?.set_password(&serde_json::to_string(token)?)?;
        debug!(%email, "Stored OAuth token");
        Ok(())
    }

    fn delete(&self, email: &str) -> Result<()> {
        match Self::entry(email)?.delete_credential() {
            Ok(()) => {
                debug!(%email, "Deleted OAuth token");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                warn!(%email, "Failed to delete OAuth token: {e}");
                Err(e.into())
            }
        }
    }
}

/// Process-local token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: StdMutex<HashMap<String, Token>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, email: &str) -> Result<Option<Token>> {
        let tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tokens.get(&email.to_lowercase()).cloned())
    }

    fn store(&self, email: &str, token: &Token) -> Result<()> {
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        tokens.insert(email.to_lowercase(), token.clone());
        Ok(())
    }

    fn delete(&self, email: &str) -> Result<()> {
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        tokens.remove(&email.to_lowercase());
        Ok(())
    }
}

/// How long a started browser sign-in can be completed.
const SIGN_IN_TTL: Duration = Duration::from_secs(10 * 60);

/// Most sign-ins awaiting their redirect at once; the oldest is dropped.
const MAX_PENDING_SIGN_INS: usize = 16;

/// Stored tokens plus the refresh that renews them.
struct AccountTokens {
    store: Arc<dyn TokenStore>,
    oauth: Option<OAuthClient>,
    refresh: Mutex<()>,
}

impl AccountTokens {
    /// Token of `email`, refreshed if expired.
    async fn current(&self, email: &str) -> Result<Token> {
        let _refreshing = self.refresh.lock().await;
        let token = self.store.load(email)?.ok_or(Error::AuthExpired)?;
        if !token.is_expired() {
            return Ok(token);
        }
        self.refresh_locked(email, &token).await
    }

    /// Replacement for a token the API rejected. A concurrent caller may
    /// already have stored one.
    async fn renew(&self, email: &str, rejected: &str) -> Result<Token> {
        let _refreshing = self.refresh.lock().await;
        let token = self.store.load(email)?.ok_or(Error::AuthExpired)?;
        if token.access_token != rejected && !token.is_expired() {
            debug!(%email, "Token already renewed");
            return Ok(token);
        }
        self.refresh_locked(email, &token).await
    }

    async fn refresh_locked(&self, email: &str, token: &Token) -> Result<Token> {
        let Some(oauth) = &self.oauth else {
            warn!(%email, "Token expired and sign-in is not configured");
            return Err(Error::AuthExpired);
        };
        let refreshed = match oauth.refresh_token(token).await {
            Ok(token) => token,
            Err(e) if e.requires_sign_in() => {
                warn!(%email, "Token refresh rejected: {e}");
                return Err(Error::AuthExpired);
            }
            Err(e) => return Err(e.into()),
        };
        self.store.store(email, &refreshed)?;
        info!(%email, "Access token refreshed");
        Ok(refreshed)
    }
}

/// Token source of one account, handed to each Gmail client.
///
/// The client stays bound to the account it was created for.
#[derive(Clone)]
pub struct AccountTokenSource {
    tokens: Arc<AccountTokens>,
    email: String,
    cached: Arc<StdMutex<Option<Token>>>,
}

impl std::fmt::Debug for AccountTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountTokenSource")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl AccountTokenSource {
    fn new(tokens: Arc<AccountTokens>, email: String) -> Self {
        Self {
            tokens,
            email,
            cached: Arc::new(StdMutex::new(None)),
        }
    }

    /// The account the tokens belong to.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    fn cached(&self) -> Option<String> {
        let cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        cached
            .as_ref()
            .filter(|t| !t.is_expired())
            .map(|t| t.access_token.clone())
    }

    fn remember(&self, token: Token) -> String {
        let access = token.access_token.clone();
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
        access
    }

    /// Loads the current token so a missing or revoked one fails before any
    /// Gmail call.
    async fn load(&self) -> Result<String> {
        let token = self.tokens.current(&self.email).await?;
        Ok(self.remember(token))
    }
}

#[async_trait]
impl AccessTokenSource for AccountTokenSource {
    async fn access_token(&self) -> mailsweep_gmail::Result<String> {
        if let Some(token) = self.cached() {
            return Ok(token);
        }
        self.load().await.map_err(into_gmail_error)
    }

    async fn renew(&self, rejected: &str) -> mailsweep_gmail::Result<String> {
        let token = self
            .tokens
            .renew(&self.email, rejected)
            .await
            .map_err(into_gmail_error)?;
        Ok(self.remember(token))
    }
}

fn into_gmail_error(err: Error) -> mailsweep_gmail::Error {
    match err {
        Error::AuthExpired | Error::NotSignedIn => mailsweep_gmail::Error::AuthExpired,
        other => mailsweep_gmail::Error::Credentials(other.to_string()),
    }
}

struct PendingSignIn {
    started: Instant,
    flow: AuthorizationCodeFlow,
}

/// Hands out authenticated Gmail clients for the active account.
pub struct CredentialProvider {
    accounts: Arc<AccountRegistry>,
    tokens: Arc<AccountTokens>,
    gmail: GmailConfig,
    pending: Mutex<HashMap<String, PendingSignIn>>,
}

impl std::fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("sign_in_enabled", &self.tokens.oauth.is_some())
            .field("gmail", &self.gmail)
            .finish_non_exhaustive()
    }
}

impl CredentialProvider {
    /// Creates a provider. Without an OAuth client, sign-in and refresh are
    /// unavailable.
    #[must_use]
    pub fn new(
        accounts: Arc<AccountRegistry>,
        store: Arc<dyn TokenStore>,
        oauth: Option<OAuthClient>,
        gmail: GmailConfig,
    ) -> Self {
        Self {
            accounts,
            tokens: Arc::new(AccountTokens {
                store,
                oauth,
                refresh: Mutex::new(()),
            }),
            gmail,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// The account registry.
    #[must_use]
    pub fn accounts(&self) -> &AccountRegistry {
        &self.accounts
    }

    /// Access token of the active account, refreshed if expired.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSignedIn`] without an active account and
    /// [`Error::AuthExpired`] when the token is missing or Google rejects
    /// the refresh.
    pub async fn access_token(&self) -> Result<String> {
        let email = self.accounts.active().await.ok_or(Error::NotSignedIn)?;
        Ok(self.tokens.current(&email).await?.access_token)
    }

    /// Token source for the active account.
    ///
    /// # Errors
    ///
    /// See [`access_token`](Self::access_token).
    pub async fn token_source(&self) -> Result<AccountTokenSource> {
        let email = self.accounts.active().await.ok_or(Error::NotSignedIn)?;
        let source = AccountTokenSource::new(Arc::clone(&self.tokens), email);
        source.load().await?;
        Ok(source)
    }

    /// Gmail client for the active account. The client renews its token
    /// whenever it expires, so it can outlive the token it started with.
    ///
    /// # Errors
    ///
    /// See [`access_token`](Self::access_token).
    pub async fn client(&self) -> Result<GmailClient> {
        let source = self.token_source().await?;
        Ok(GmailClient::with_token_source(Arc::new(source), self.gmail.clone())?)
    }

    /// Starts a browser sign-in and returns the consent URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no OAuth client is configured.
    pub async fn authorization_url(&self) -> Result<String> {
        let oauth = self
            .tokens
            .oauth
            .clone()
            .ok_or_else(|| Error::Config("Sign-in is not configured (MAILSWEEP_CLIENT_ID)".into()))?;
        let flow = AuthorizationCodeFlow::new(oauth);
        let url = flow.authorization_url(None).to_string();

        let mut pending = self.pending.lock().await;
        pending.retain(|_, p| p.started.elapsed() < SIGN_IN_TTL);
        while pending.len() >= MAX_PENDING_SIGN_INS {
            let Some(oldest) = pending
                .iter()
                .min_by_key(|(_, p)| p.started)
                .map(|(state, _)| state.clone())
            else {
                break;
            };
            debug!("Dropping oldest pending sign-in");
            pending.remove(&oldest);
        }
        pending.insert(
            flow.state().to_string(),
            PendingSignIn {
                started: Instant::now(),
                flow,
            },
        );
        Ok(url)
    }

    #[cfg(test)]
    async fn pending_sign_ins(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Finishes a sign-in from the OAuth redirect and makes the mailbox the
    /// active account. Returns its address.
    ///
    /// # Errors
    ///
    /// Returns an OAuth error for an unknown `state` or a failed exchange,
    /// or the error of the profile lookup.
    pub async fn complete_sign_in(&self, code: &str, state: &str) -> Result<String> {
        let flow = self
            .pending
            .lock()
            .await
            .remove(state)
            .filter(|p| p.started.elapsed() < SIGN_IN_TTL)
            .ok_or(mailsweep_oauth::Error::StateMismatch)?
            .flow;
        let token = flow.complete(code, state).await?;
        let client = GmailClient::with_config(token.access_token.clone(), self.gmail.clone())?;
        let email = client.profile().await?.email_address.to_lowercase();
        self.tokens.store.store(&email, &token)?;
        self.accounts.add(&email).await?;
        Ok(email)
    }

    /// Removes an account and its token. Returns the new active address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] or a storage error.
    pub async fn remove_account(&self, email: &str) -> Result<Option<String>> {
        let active = self.accounts.remove(email).await?;
        self.tokens.store.delete(email)?;
        Ok(active)
    }

    /// Signs out the active account. Returns the new active address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSignedIn`] or a storage error.
    pub async fn sign_out(&self) -> Result<Option<String>> {
        let removed = self.accounts.sign_out().await?;
        self.tokens.store.delete(&removed)?;
        Ok(self.accounts.active().await)
    }
}
