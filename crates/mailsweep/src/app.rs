//! Shared state of the HTTP handlers.

use std::sync::Arc;

use mailsweep_core::{
    AccountRegistry, ActionExecutor, CredentialProvider, OperationKind, Result, ScanEngine,
    SenderGroup, Settings, StateRegistry, TokenStore, Unsubscriber,
};
use mailsweep_gmail::{Config as GmailConfig, GmailClient};
use mailsweep_oauth::{OAuthClient, Provider};

/// Everything a request handler needs; cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    pub states: StateRegistry,
    pub credentials: Arc<CredentialProvider>,
    pub scanner: ScanEngine,
    pub executor: ActionExecutor,
    pub unsubscriber: Unsubscriber,
    pub batch_size: usize,
    pub max_export_threads: usize,
}

impl AppState {
    /// Builds the state from settings, keeping tokens in `store`.
    pub async fn new(settings: &Settings, store: Arc<dyn TokenStore>) -> Result<Self> {
        let gmail = GmailConfig::builder()
            .api_base(settings.gmail_api_base.clone())
            .max_batch_size(settings.batch_size)
            .build();

        let oauth = match settings.client_id.as_deref() {
            Some(client_id) if settings.sign_in_enabled() => {
                let mut client = OAuthClient::new(client_id, Provider::google()?)
                    .with_redirect_uri(format!("http://{}/oauth/callback", settings.listen_addr));
                if let Some(secret) = &settings.client_secret {
                    client = client.with_client_secret(secret.clone());
                }
                Some(client)
            }
            _ => None,
        };

        let accounts = Arc::new(AccountRegistry::open(&settings.data_dir).await?);
        Ok(Self {
            states: StateRegistry::new(),
            credentials: Arc::new(CredentialProvider::new(accounts, store, oauth, gmail)),
            scanner: ScanEngine::new(settings.page_size, settings.batch_size),
            executor: ActionExecutor::new(settings.batch_size),
            unsubscriber: Unsubscriber::new()?,
            batch_size: settings.batch_size,
            max_export_threads: settings.max_export_threads,
        })
    }

    /// Gmail client of the active account.
    pub async fn gmail(&self) -> Result<GmailClient> {
        self.credentials.client().await
    }

    /// Groups from both scans, delete-scan first, for resolving action
    /// senders.
    pub fn scanned_groups(&self) -> Vec<SenderGroup> {
        [OperationKind::DeleteScan, OperationKind::UnsubscribeScan]
            .into_iter()
            .flat_map(|kind| self.states.results(kind).as_ref().clone())
            .collect()
    }
}
