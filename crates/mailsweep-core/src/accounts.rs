//! Signed-in account registry.
//!
//! The registry is a small JSON document, `accounts.json` in the data
//! directory, listing every signed-in mailbox and which one is active.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

const ACCOUNTS_FILE: &str = "accounts.json";

/// A signed-in mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Mailbox address.
    pub email: String,
}

/// Contents of `accounts.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountList {
    /// Accounts in sign-in order.
    pub accounts: Vec<Account>,
    /// Address of the active account.
    pub active: Option<String>,
}

impl AccountList {
    fn position(&self, email: &str) -> Option<usize> {
        self.accounts
            .iter()
            .position(|a| a.email.eq_ignore_ascii_case(email.trim()))
    }
}

/// Persistent list of accounts with one active entry.
#[derive(Debug)]
pub struct AccountRegistry {
    path: PathBuf,
    list: Mutex<AccountList>,
}

impl AccountRegistry {
    /// Opens the registry in `data_dir`, starting empty if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(ACCOUNTS_FILE);
        let list = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let contents = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&contents)?
        } else {
            AccountList::default()
        };
        debug!(path = %path.display(), accounts = list.accounts.len(), "Opened account registry");
        Ok(Self {
            path,
            list: Mutex::new(list),
        })
    }

    /// Snapshot of all accounts.
    pub async fn list(&self) -> AccountList {
        self.list.lock().await.clone()
    }

    /// Address of the active account.
    pub async fn active(&self) -> Option<String> {
        self.list.lock().await.active.clone()
    }

    /// Adds an account (if new) and makes it active.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be saved.
    pub async fn add(&self, email: &str) -> Result<()> {
        let email = email.trim().to_lowercase();
        let mut list = self.list.lock().await;
        if list.position(&email).is_none() {
            list.accounts.push(Account {
                email: email.clone(),
            });
        }
        list.active = Some(email.clone());
        self.save(&list).await?;
        info!(%email, "Account signed in");
        Ok(())
    }

    /// Makes an existing account active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] for unknown addresses.
    pub async fn switch(&self, email: &str) -> Result<()> {
        let mut list = self.list.lock().await;
        let index = list
            .position(email)
            .ok_or_else(|| Error::AccountNotFound(email.to_string()))?;
        list.active = Some(list.accounts[index].email.clone());
        self.save(&list).await?;
        info!(email = %list.accounts[index].email, "Switched account");
        Ok(())
    }

    /// Removes an account; the first remaining one becomes active if the
    /// removed one was. Returns the new active address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] for unknown addresses.
    pub async fn remove(&self, email: &str) -> Result<Option<String>> {
        let mut list = self.list.lock().await;
        let index = list
            .position(email)
            .ok_or_else(|| Error::AccountNotFound(email.to_string()))?;
        let removed = list.accounts.remove(index);
        let was_active = list
            .active
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case(&removed.email));
        if was_active {
            list.active = list.accounts.first().map(|a| a.email.clone());
        }
        self.save(&list).await?;
        info!(email = %removed.email, "Account removed");
        Ok(list.active.clone())
    }

    /// Removes the active account. Returns the removed address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSignedIn`] when no account is active.
    pub async fn sign_out(&self) -> Result<String> {
        let active = self.active().await.ok_or(Error::NotSignedIn)?;
        self.remove(&active).await?;
        Ok(active)
    }

    async fn save(&self, list: &AccountList) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_string_pretty(list)?).await?;
        Ok(())
    }
}
