//! # mailsweep-core
//!
//! Mailbox cleanup logic for mailsweep.
//!
//! This crate provides:
//! - **Scan engine** - pages a filtered listing, batches metadata fetches and
//!   groups messages by sender, tolerating per-item failures
//! - **Operation state** - one busy flag, progress and result set per
//!   operation kind, readable by pollers at any time
//! - **Bulk actions** - mark read, trash, archive, label and mark important
//!   per sender
//! - **Unsubscribe helpers** - link extraction and guarded one-click visits
//! - **Search and export** - thread previews and plain-text export
//! - **Accounts** - account registry, keyring token storage and refresh
//! - **Settings** - JSON file plus environment overrides

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod accounts;
pub mod actions;
pub mod credentials;
mod error;
pub mod filter;
pub mod labels;
pub mod scan;
pub mod search;
pub mod sender;
pub mod settings;
pub mod state;
pub mod unsubscribe;
mod validation;

#[cfg(test)]
mod testing;

pub use accounts::{Account, AccountList, AccountRegistry};
pub use actions::{Action, ActionExecutor, ActionOutcome, SenderOutcome, unread_count};
pub use credentials::{
    AccountTokenSource, CredentialProvider, KeyringTokenStore, MemoryTokenStore, TokenStore,
};
pub use error::{Error, Result};
pub use filter::{Category, FilterConfig};
pub use scan::{ScanEngine, ScanLimit, ScanSummary, collect_message_ids};
pub use search::{
    MAX_SEARCH_RESULTS, MessagePreview, SearchResults, ThreadPreview, export_by_query,
    export_threads, preview_sender, search_threads,
};
pub use sender::{SenderAggregator, SenderGroup, UNKNOWN_SENDER, parse_sender};
pub use settings::Settings;
pub use state::{OperationKind, Progress, RunGuard, ScanState, StateRegistry, StatusSnapshot};
pub use unsubscribe::{
    LabelUnsubscribeReport, UnsubscribeLink, UnsubscribeResult, Unsubscriber,
    process_unsubscribe_label,
};
pub use validation::ValidationError;
