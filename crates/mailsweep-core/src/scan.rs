//! The scan engine.
//!
//! A scan pages through the message listing for one filter, fetches the
//! listed messages through the batch gateway and folds every successful item
//! into a [`SenderAggregator`]. Item failures are logged and counted; only a
//! failure of a whole call ends the run.

use mailsweep_gmail::{Gateway, MAX_BATCH_SIZE, MAX_PAGE_SIZE, MessageFormat};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::filter::FilterConfig;
use crate::sender::{SenderAggregator, SenderGroup};
use crate::state::{OperationKind, RunGuard, StateRegistry};
use crate::unsubscribe;
use crate::validation::ValidationError;

/// How many listed messages a scan may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanLimit {
    /// Walk the listing until it is exhausted.
    #[default]
    All,
    /// Stop after this many message IDs.
    AtMost(usize),
}

impl ScanLimit {
    /// Builds a limit from an optional count; `None` and zero mean all.
    #[must_use]
    pub const fn from_option(limit: Option<usize>) -> Self {
        match limit {
            Some(n) if n > 0 => Self::AtMost(n),
            _ => Self::All,
        }
    }

    const fn remaining(self, taken: usize) -> Option<usize> {
        match self {
            Self::All => None,
            Self::AtMost(n) => Some(n.saturating_sub(taken)),
        }
    }
}

/// Totals of one finished scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Messages fetched, successfully or not.
    pub processed: usize,
    /// Messages that could not be fetched.
    pub failed_count: usize,
    /// Sender groups published.
    pub senders: usize,
}

/// Paginates, batches and aggregates one scan.
#[derive(Debug, Clone, Copy)]
pub struct ScanEngine {
    page_size: u32,
    batch_size: usize,
}

impl Default for ScanEngine {
    fn default() -> Self {
        Self::new(MAX_PAGE_SIZE, MAX_BATCH_SIZE)
    }
}

impl ScanEngine {
    /// Creates an engine; both sizes are clamped to the API limits.
    #[must_use]
    pub fn new(page_size: u32, batch_size: usize) -> Self {
        Self {
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
        }
    }

    /// Validates the filter and claims the busy flag of `kind`.
    ///
    /// Callers that run the scan in the background claim first so a
    /// conflicting start is reported synchronously.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad filter or a non-scan kind, or
    /// [`Error::AlreadyInProgress`] if a scan of this kind is running.
    pub fn begin(
        &self,
        states: &StateRegistry,
        kind: OperationKind,
        filter: &FilterConfig,
    ) -> Result<RunGuard> {
        if !kind.is_scan() {
            return Err(ValidationError::WrongOperation.into());
        }
        filter.validate()?;
        states.get(kind).try_begin()
    }

    /// Runs a scan claimed with [`begin`](Self::begin) to completion.
    ///
    /// # Errors
    ///
    /// Returns the transport or auth error that aborted the run. The state
    /// is already marked aborted and idle when this returns.
    pub async fn run<G: Gateway>(
        &self,
        gateway: &G,
        guard: RunGuard,
        filter: &FilterConfig,
        limit: ScanLimit,
    ) -> Result<ScanSummary> {
        let query = filter.to_query(&[]);
        debug!(kind = %guard.kind(), %query, "Scanning");
        match self.collect_groups(gateway, &guard, &query, limit).await {
            Ok(groups) => {
                let summary = ScanSummary {
                    processed: guard.progress().processed,
                    failed_count: guard.failed_count(),
                    senders: groups.len(),
                };
                guard.complete_scan(groups);
                Ok(summary)
            }
            Err(err) => {
                guard.abort(&err);
                Err(err)
            }
        }
    }

    /// Claims `kind` and runs the scan in the current task.
    ///
    /// # Errors
    ///
    /// See [`begin`](Self::begin) and [`run`](Self::run).
    pub async fn start_scan<G: Gateway>(
        &self,
        gateway: &G,
        states: &StateRegistry,
        kind: OperationKind,
        filter: &FilterConfig,
        limit: ScanLimit,
    ) -> Result<ScanSummary> {
        let guard = self.begin(states, kind, filter)?;
        self.run(gateway, guard, filter, limit).await
    }

    async fn collect_groups<G: Gateway>(
        &self,
        gateway: &G,
        guard: &RunGuard,
        query: &str,
        limit: ScanLimit,
    ) -> Result<Vec<SenderGroup>> {
        let wants_links = guard.kind() == OperationKind::UnsubscribeScan;
        let format = if wants_links {
            MessageFormat::Full
        } else {
            MessageFormat::Metadata
        };
        let chunk_size = self.batch_size.min(gateway.max_batch_size()).max(1);

        let mut aggregator = SenderAggregator::new();
        let mut page_token: Option<String> = None;
        let mut listed = 0;
        loop {
            let remaining = limit.remaining(listed);
            if remaining == Some(0) {
                break;
            }
            let page = gateway
                .list_messages(query, page_token.as_deref(), page_request(self.page_size, remaining))
                .await?;
            let mut ids: Vec<String> = page.messages.into_iter().map(|m| m.id).collect();
            if let Some(remaining) = remaining {
                ids.truncate(remaining);
            }
            listed += ids.len();
            guard.discover(listed);
            guard.set_message(format!("Listed {listed} messages"));

            for chunk in ids.chunks(chunk_size) {
                let mut failures = 0;
                gateway
                    .fetch_messages(chunk, format, |id, outcome| match outcome {
                        Ok(message) => {
                            let link = if wants_links {
                                unsubscribe::extract(&message)
                            } else {
                                None
                            };
                            aggregator.add(&message, link);
                        }
                        Err(failure) => {
                            warn!(id, reason = %failure, "Message fetch failed");
                            failures += 1;
                        }
                    })
                    .await?;
                guard.record_batch(chunk.len(), failures);
            }

            page_token = page.next_page_token.filter(|t| !t.is_empty());
            if page_token.is_none() {
                break;
            }
        }

        let mut groups = aggregator.finish();
        if wants_links {
            groups.retain(|g| g.unsubscribe.is_some());
        }
        Ok(groups)
    }
}

fn page_request(page_size: u32, remaining: Option<usize>) -> u32 {
    remaining.map_or(page_size, |r| {
        u32::try_from(r).unwrap_or(u32::MAX).min(page_size)
    })
}

/// Lists message IDs matching `query` across all pages, up to `limit`.
///
/// # Errors
///
/// Returns the error of the first failed listing call.
pub async fn collect_message_ids<G: Gateway>(
    gateway: &G,
    query: &str,
    limit: Option<usize>,
) -> Result<Vec<String>> {
    let limit = ScanLimit::from_option(limit);
    let mut ids = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
        let remaining = limit.remaining(ids.len());
        if remaining == Some(0) {
            break;
        }
        let page = gateway
            .list_messages(query, page_token.as_deref(), page_request(MAX_PAGE_SIZE, remaining))
            .await
            .map_err(Error::from)?;
        ids.extend(page.messages.into_iter().map(|m| m.id));
        page_token = page.next_page_token.filter(|t| !t.is_empty());
        if page_token.is_none() {
            break;
        }
    }
    if let ScanLimit::AtMost(n) = limit {
        ids.truncate(n);
    }
    Ok(ids)
}
