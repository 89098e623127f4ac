//! Thread search, sender preview and plain-text export.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use mailsweep_gmail::{Gateway, ItemResult, MAX_BATCH_SIZE, MAX_PAGE_SIZE, MessageFormat, Thread};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::filter::is_query_safe;
use crate::validation::ValidationError;

const RULE_WIDTH: usize = 80;

/// Largest preview size.
pub const MAX_PREVIEW: usize = 50;

/// Most threads one search returns.
pub const MAX_SEARCH_RESULTS: usize = 500;

/// Summary of one thread for search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadPreview {
    /// Thread ID.
    pub id: String,
    /// `From` of the first message.
    pub sender: String,
    /// Subject of the first message.
    pub subject: String,
    /// Receive time of the latest message.
    pub date: Option<DateTime<Utc>>,
    /// Snippet of the thread.
    pub snippet: String,
    /// Messages in the thread.
    pub message_count: usize,
}

impl ThreadPreview {
    fn from_thread(thread: &Thread) -> Self {
        let first = thread.first_message();
        let header = |name| {
            first
                .and_then(|m| m.header(name))
                .unwrap_or_default()
                .to_string()
        };
        Self {
            id: thread.id.clone(),
            sender: header("From"),
            subject: header("Subject"),
            date: thread.last_message().and_then(mailsweep_gmail::Message::received_at),
            snippet: thread
                .snippet
                .clone()
                .or_else(|| thread.last_message().and_then(|m| m.snippet.clone()))
                .unwrap_or_default(),
            message_count: thread.messages.len(),
        }
    }
}

/// Threads found by [`search_threads`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResults {
    /// Previews in listing order.
    pub threads: Vec<ThreadPreview>,
    /// Threads that were listed but could not be fetched.
    pub failed_count: usize,
}

/// One recent message of a sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessagePreview {
    /// Message ID.
    pub id: String,
    /// Subject line.
    pub subject: String,
    /// Receive time.
    pub date: Option<DateTime<Utc>>,
    /// Gmail snippet.
    pub snippet: String,
}

fn require_query(query: &str) -> Result<&str> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ValidationError::EmptyQuery.into());
    }
    Ok(query)
}

async fn list_thread_ids<G: Gateway>(gateway: &G, query: &str, max: usize) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut page_token: Option<String> = None;
    while ids.len() < max {
        let want = u32::try_from(max - ids.len()).unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let page = gateway.list_threads(query, page_token.as_deref(), want).await?;
        ids.extend(page.threads.into_iter().map(|t| t.id));
        page_token = page.next_page_token.filter(|t| !t.is_empty());
        if page_token.is_none() {
            break;
        }
    }
    ids.truncate(max);
    Ok(ids)
}

async fn fetch_all_threads<G: Gateway>(
    gateway: &G,
    ids: &[String],
    format: MessageFormat,
) -> Result<Vec<(String, ItemResult<Thread>)>> {
    let chunk_size = gateway.max_batch_size().clamp(1, MAX_BATCH_SIZE);
    let mut outcomes = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(chunk_size) {
        gateway
            .fetch_threads(chunk, format, |id, outcome| {
                outcomes.push((id.to_string(), outcome));
            })
            .await?;
    }
    Ok(outcomes)
}

/// Searches threads and returns up to `max_results` previews, at most
/// [`MAX_SEARCH_RESULTS`].
///
/// # Errors
///
/// Returns [`ValidationError::EmptyQuery`] for a blank query, or the error
/// of a failed listing or batch call.
pub async fn search_threads<G: Gateway>(
    gateway: &G,
    query: &str,
    max_results: usize,
) -> Result<SearchResults> {
    let query = require_query(query)?;
    let ids = list_thread_ids(gateway, query, max_results.clamp(1, MAX_SEARCH_RESULTS)).await?;
    let mut results = SearchResults::default();
    for (id, outcome) in fetch_all_threads(gateway, &ids, MessageFormat::Metadata).await? {
        match outcome {
            Ok(thread) => results.threads.push(ThreadPreview::from_thread(&thread)),
            Err(failure) => {
                warn!(id, reason = %failure, "Thread fetch failed");
                results.failed_count += 1;
            }
        }
    }
    info!(%query, threads = results.threads.len(), "Thread search finished");
    Ok(results)
}

/// Renders the given threads as one plain-text document.
///
/// `title` is shown as the search query in the header. Threads that cannot
/// be fetched appear as an error line in their place.
///
/// # Errors
///
/// Returns [`ValidationError::NoThreads`] for an empty selection, or the
/// error of a failed batch call.
pub async fn export_threads<G: Gateway>(gateway: &G, ids: &[String], title: &str) -> Result<String> {
    if ids.is_empty() {
        return Err(ValidationError::NoThreads.into());
    }
    let outcomes = fetch_all_threads(gateway, ids, MessageFormat::Full).await?;
    let text = render_export(title, &outcomes);
    info!(threads = ids.len(), chars = text.len(), "Export rendered");
    Ok(text)
}

/// Searches threads and exports up to `max_threads` of them.
///
/// `max_threads` is clamped to `1..=cap`.
///
/// # Errors
///
/// See [`search_threads`] and [`export_threads`].
pub async fn export_by_query<G: Gateway>(
    gateway: &G,
    query: &str,
    max_threads: usize,
    cap: usize,
) -> Result<String> {
    let query = require_query(query)?;
    let max = max_threads.clamp(1, cap.max(1));
    let ids = list_thread_ids(gateway, query, max).await?;
    if ids.is_empty() {
        return Ok("No email threads found matching your query.".to_string());
    }
    export_threads(gateway, &ids, query).await
}

/// Most recent messages from `sender`, newest first as listed.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidSender`] for an unusable sender, or
/// the error of a failed listing or batch call.
pub async fn preview_sender<G: Gateway>(
    gateway: &G,
    sender: &str,
    limit: usize,
) -> Result<Vec<MessagePreview>> {
    if !is_query_safe(sender, false) {
        return Err(ValidationError::InvalidSender.into());
    }
    let limit = limit.clamp(1, MAX_PREVIEW);
    let query = format!("from:{}", sender.trim());
    #[allow(clippy::cast_possible_truncation)]
    let page = gateway.list_messages(&query, None, limit as u32).await?;
    let ids: Vec<String> = page.messages.into_iter().take(limit).map(|m| m.id).collect();

    let mut previews = Vec::with_capacity(ids.len());
    gateway
        .fetch_messages(&ids, MessageFormat::Metadata, |id, outcome| match outcome {
            Ok(message) => previews.push(MessagePreview {
                subject: message.header("Subject").unwrap_or("(no subject)").to_string(),
                date: message.received_at(),
                snippet: message.snippet.clone().unwrap_or_default(),
                id: message.id,
            }),
            Err(failure) => warn!(id, reason = %failure, "Preview fetch failed"),
        })
        .await?;
    Ok(previews)
}

fn render_export(title: &str, outcomes: &[(String, ItemResult<Thread>)]) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let total = outcomes.len();
    let mut out = String::new();
    let _ = writeln!(out, "Gmail Thread Export");
    let _ = writeln!(out, "Search Query: {title}");
    let _ = writeln!(out, "Total Threads: {total}");
    let _ = writeln!(out, "{rule}");

    for (index, (id, outcome)) in outcomes.iter().enumerate() {
        match outcome {
            Ok(thread) => {
                let count = thread.messages.len();
                let _ = writeln!(out, "\n{rule}");
                let _ = writeln!(out, "THREAD {} of {total} (ID: {id})", index + 1);
                let _ = writeln!(out, "Messages in thread: {count}");
                let _ = writeln!(out, "{rule}\n");
                for (position, message) in thread.messages.iter().enumerate() {
                    let header = |name| message.header(name).unwrap_or_default();
                    let _ = writeln!(out, "--- Message {} of {count} ---", position + 1);
                    let _ = writeln!(out, "From: {}", header("From"));
                    let _ = writeln!(out, "Date: {}", header("Date"));
                    let _ = writeln!(out, "Subject: {}", header("Subject"));
                    let _ = writeln!(out, "\n{}\n", message.body_text());
                    let _ = writeln!(out, "---\n");
                }
            }
            Err(failure) => {
                warn!(id, reason = %failure, "Thread export failed");
                let _ = writeln!(out, "\nError fetching thread {id}: {failure}\n");
            }
        }
    }

    let _ = writeln!(out, "\n{rule}");
    let _ = writeln!(out, "End of Export - {total} thread(s)");
    let _ = write!(out, "{rule}");
    out
}
