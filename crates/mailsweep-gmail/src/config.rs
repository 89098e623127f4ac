//! Client configuration types.

use std::time::Duration;

/// Production Gmail API host.
pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com";

/// Path of the Gmail batch endpoint, relative to the API base.
pub const BATCH_PATH: &str = "/batch/gmail/v1";

/// Hard limit of sub-requests in one batch call imposed by the API.
pub const MAX_BATCH_SIZE: usize = 100;

/// Largest page the `messages.list` / `threads.list` endpoints return.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Gmail client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Scheme and host of the API, without trailing slash.
    pub api_base: String,
    /// Mailbox owner; `me` addresses the authenticated user.
    pub user_id: String,
    /// Per-request timeout. Expiry surfaces as a transport error.
    pub request_timeout: Duration,
    /// Maximum IDs accepted per batch call (never above [`MAX_BATCH_SIZE`]).
    pub max_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            user_id: "me".to_string(),
            request_timeout: Duration::from_secs(60),
            max_batch_size: MAX_BATCH_SIZE,
        }
    }
}

impl Config {
    /// Creates a configuration for the production API.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Full URL of the batch endpoint.
    #[must_use]
    pub fn batch_url(&self) -> String {
        format!("{}{BATCH_PATH}", self.api_base)
    }

    /// Path prefix used inside batch parts and for direct calls.
    #[must_use]
    pub fn user_path(&self) -> String {
        format!("/gmail/v1/users/{}", self.user_id)
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    api_base: Option<String>,
    user_id: Option<String>,
    request_timeout: Option<Duration>,
    max_batch_size: Option<usize>,
}

impl ConfigBuilder {
    /// Points the client at another host (tests, proxies).
    #[must_use]
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    /// Sets the mailbox owner.
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the batch size limit, clamped to `1..=MAX_BATCH_SIZE`.
    #[must_use]
    pub const fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        let defaults = Config::default();
        Config {
            api_base: self
                .api_base
                .map_or(defaults.api_base, |b| b.trim().trim_end_matches('/').to_string()),
            user_id: self.user_id.unwrap_or(defaults.user_id),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            max_batch_size: self
                .max_batch_size
                .map_or(MAX_BATCH_SIZE, |s| s.clamp(1, MAX_BATCH_SIZE)),
        }
    }
}
