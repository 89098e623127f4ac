//! Application settings.
//!
//! Settings are read from `<config_dir>/mailsweep/settings.json` when the
//! file exists and then overridden by `MAILSWEEP_*` environment variables.

use std::path::{Path, PathBuf};

use mailsweep_gmail::{MAX_BATCH_SIZE, MAX_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

const APP_DIR: &str = "mailsweep";
const SETTINGS_FILE: &str = "settings.json";

/// Runtime settings of the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the HTTP API listens on.
    pub listen_addr: String,
    /// OAuth client ID; sign-in is disabled without it.
    pub client_id: Option<String>,
    /// OAuth client secret for web-type clients.
    pub client_secret: Option<String>,
    /// IDs per batch call.
    pub batch_size: usize,
    /// IDs per listing page.
    pub page_size: u32,
    /// Upper bound for export-by-query.
    pub max_export_threads: usize,
    /// Where `accounts.json` lives.
    pub data_dir: PathBuf,
    /// Gmail API base URL.
    pub gmail_api_base: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8766".to_string(),
            client_id: None,
            client_secret: None,
            batch_size: MAX_BATCH_SIZE,
            page_size: MAX_PAGE_SIZE,
            max_export_threads: 500,
            data_dir: default_dir(),
            gmail_api_base: mailsweep_gmail::config::DEFAULT_API_BASE.to_string(),
        }
    }
}

fn default_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl Settings {
    /// Default location of the settings file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        default_dir().join(SETTINGS_FILE)
    }

    /// Loads settings from the default file and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// an environment override is malformed.
    pub async fn load() -> Result<Self> {
        let settings = Self::load_from(&Self::default_path()).await?;
        settings.with_env(|key| std::env::var(key).ok())
    }

    /// Loads settings from `path`, using defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }
        let contents = tokio::fs::read_to_string(path).await?;
        let settings: Self = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings.normalized())
    }

    /// Applies `MAILSWEEP_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `MAILSWEEP_BATCH_SIZE` is not a number.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(addr) = var("MAILSWEEP_LISTEN") {
            self.listen_addr = addr;
        }
        if let Some(id) = var("MAILSWEEP_CLIENT_ID") {
            self.client_id = Some(id);
        }
        if let Some(secret) = var("MAILSWEEP_CLIENT_SECRET") {
            self.client_secret = Some(secret);
        }
        if let Some(size) = var("MAILSWEEP_BATCH_SIZE") {
            self.batch_size = size
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("MAILSWEEP_BATCH_SIZE is not a number: {size}")))?;
        }
        if let Some(dir) = var("MAILSWEEP_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(base) = var("MAILSWEEP_GMAIL_API") {
            self.gmail_api_base = base.trim_end_matches('/').to_string();
        }
        Ok(self.normalized())
    }

    /// Saves settings to `path`, creating its directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(path, serde_json::to_string_pretty(self)?).await?;
        debug!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// Returns `true` when an OAuth client is configured.
    #[must_use]
    pub fn sign_in_enabled(&self) -> bool {
        self.client_id.as_deref().is_some_and(|id| !id.trim().is_empty())
    }

    fn normalized(mut self) -> Self {
        let batch = self.batch_size.clamp(1, MAX_BATCH_SIZE);
        if batch != self.batch_size {
            warn!(requested = self.batch_size, used = batch, "Batch size out of range");
            self.batch_size = batch;
        }
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self.max_export_threads = self.max_export_threads.max(1);
        self
    }
}
