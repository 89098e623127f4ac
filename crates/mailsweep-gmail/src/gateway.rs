//! The batch RPC gateway contract.
//!
//! A [`Gateway`] turns a bounded list of item IDs into one physical batch
//! call and reports the outcome of every item through a callback:
//!
//! - the callback runs **exactly once per submitted ID**, in submission
//!   order, with either the item's payload or an [`ItemFailure`];
//! - a failing item never fails the call; only transport problems and
//!   stale credentials do (`Err(Error::AuthExpired)` for the latter);
//! - there is no retry inside the gateway.
//!
//! Deleting is only possible through [`Gateway::trash_messages`]; the
//! contract has no permanent-delete operation.

use std::future::Future;

use crate::error::Result;
use crate::types::{Label, LabelChange, Message, MessageList, Profile, Thread, ThreadList};

/// Outcome of one item inside a batch.
pub type ItemResult<T> = std::result::Result<T, ItemFailure>;

/// Why a single batch item could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ItemFailure {
    /// Status code of the sub-response, when one was received.
    pub status: Option<u16>,
    /// Human-readable reason.
    pub reason: String,
}

impl ItemFailure {
    /// Failure reported by the API for this item.
    #[must_use]
    pub fn with_status(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            reason: reason.into(),
        }
    }

    /// Failure detected locally (missing part, undecodable payload).
    #[must_use]
    pub fn local(reason: impl Into<String>) -> Self {
        Self {
            status: None,
            reason: reason.into(),
        }
    }
}

/// How much of a message or thread to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFormat {
    /// IDs, labels, snippet and dates only.
    Minimal,
    /// Minimal plus the headers in [`METADATA_HEADERS`].
    #[default]
    Metadata,
    /// Complete MIME tree including bodies.
    Full,
}

/// Headers requested in [`MessageFormat::Metadata`].
pub const METADATA_HEADERS: &[&str] = &[
    "From",
    "Subject",
    "Date",
    "List-Unsubscribe",
    "List-Unsubscribe-Post",
];

impl MessageFormat {
    /// Value of the `format` query parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Metadata => "metadata",
            Self::Full => "full",
        }
    }

    /// Query string for a GET of a message or thread in this format.
    #[must_use]
    pub fn query_string(self) -> String {
        let mut query = format!("format={}", self.as_str());
        if self == Self::Metadata {
            for header in METADATA_HEADERS {
                query.push_str("&metadataHeaders=");
                query.push_str(header);
            }
        }
        query
    }
}

/// Remote mailbox operations used by the scan engine and executors.
pub trait Gateway: Send + Sync {
    /// Largest number of IDs accepted by one batch call.
    fn max_batch_size(&self) -> usize;

    /// Lists one page of message IDs matching `query`.
    fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> impl Future<Output = Result<MessageList>> + Send;

    /// Lists one page of thread IDs matching `query`.
    fn list_threads(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> impl Future<Output = Result<ThreadList>> + Send;

    /// Fetches messages in one batch call.
    fn fetch_messages<F>(
        &self,
        ids: &[String],
        format: MessageFormat,
        on_item: F,
    ) -> impl Future<Output = Result<()>> + Send
    where
        F: FnMut(&str, ItemResult<Message>) + Send;

    /// Fetches threads in one batch call.
    fn fetch_threads<F>(
        &self,
        ids: &[String],
        format: MessageFormat,
        on_item: F,
    ) -> impl Future<Output = Result<()>> + Send
    where
        F: FnMut(&str, ItemResult<Thread>) + Send;

    /// Adds and removes labels on messages in one batch call.
    fn modify_messages<F>(
        &self,
        ids: &[String],
        change: &LabelChange,
        on_item: F,
    ) -> impl Future<Output = Result<()>> + Send
    where
        F: FnMut(&str, ItemResult<()>) + Send;

    /// Moves messages to the trash in one batch call.
    fn trash_messages<F>(&self, ids: &[String], on_item: F) -> impl Future<Output = Result<()>> + Send
    where
        F: FnMut(&str, ItemResult<()>) + Send;

    /// Lists every label of the mailbox.
    fn list_labels(&self) -> impl Future<Output = Result<Vec<Label>>> + Send;

    /// Creates a user label.
    fn create_label(&self, name: &str) -> impl Future<Output = Result<Label>> + Send;

    /// Deletes a user label.
    fn delete_label(&self, label_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Profile of the authenticated mailbox.
    fn profile(&self) -> impl Future<Output = Result<Profile>> + Send;
}
