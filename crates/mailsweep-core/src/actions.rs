//! Bulk actions applied per sender.
//!
//! An executor walks the selected senders, takes each sender's message IDs
//! from the scan results (or lists `from:<sender>` when the sender is not in
//! them) and applies one mutation in gateway-sized chunks. Item failures are
//! counted per sender and in total; they never stop the remaining senders.
//!
//! Delete always moves messages to the trash.

use std::collections::HashSet;

use mailsweep_gmail::{Gateway, LabelChange, MAX_BATCH_SIZE, system};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::filter::{FilterConfig, is_query_safe};
use crate::labels;
use crate::scan::collect_message_ids;
use crate::sender::SenderGroup;
use crate::state::{OperationKind, RunGuard, StateRegistry};
use crate::validation::ValidationError;

/// A mutation applied to every message of the selected senders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "label", rename_all = "kebab-case")]
pub enum Action {
    /// Remove `UNREAD`.
    MarkRead,
    /// Move to trash.
    Delete,
    /// Remove `INBOX`.
    Archive,
    /// Add a user label, creating it if needed.
    ApplyLabel(String),
    /// Remove an existing user label.
    RemoveLabel(String),
    /// Add `IMPORTANT`.
    MarkImportant,
}

impl Action {
    /// Parses the action segment of `/api/actions/{action}`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::WrongOperation`] for an unknown name and
    /// [`ValidationError::InvalidLabel`] when a label action has no label.
    pub fn from_name(name: &str, label: Option<String>) -> std::result::Result<Self, ValidationError> {
        let named = || {
            label
                .clone()
                .filter(|l| !l.trim().is_empty())
                .ok_or(ValidationError::InvalidLabel)
        };
        Ok(match name {
            "mark-read" => Self::MarkRead,
            "delete" => Self::Delete,
            "archive" => Self::Archive,
            "apply-label" => Self::ApplyLabel(named()?),
            "remove-label" => Self::RemoveLabel(named()?),
            "mark-important" => Self::MarkImportant,
            _ => return Err(ValidationError::WrongOperation),
        })
    }

    /// State slot this action runs under.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::MarkRead => OperationKind::MarkRead,
            Self::Delete => OperationKind::Delete,
            Self::Archive => OperationKind::Archive,
            Self::ApplyLabel(_) | Self::RemoveLabel(_) => OperationKind::Label,
            Self::MarkImportant => OperationKind::MarkImportant,
        }
    }

    fn label_name(&self) -> Option<&str> {
        match self {
            Self::ApplyLabel(name) | Self::RemoveLabel(name) => Some(name),
            _ => None,
        }
    }
}

/// Result of one sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderOutcome {
    /// Sender address.
    pub sender: String,
    /// Messages submitted.
    pub processed: usize,
    /// Messages that failed.
    pub failed: usize,
    /// Why nothing was submitted for this sender.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SenderOutcome {
    /// Returns `true` when every message succeeded.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.failed == 0 && self.error.is_none()
    }
}

/// Summary of one action run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    /// Senders whose messages all succeeded.
    pub succeeded_senders: usize,
    /// Messages submitted over all senders.
    pub processed: usize,
    /// Messages that failed over all senders.
    pub failed_count: usize,
    /// Per-sender results in request order.
    pub details: Vec<SenderOutcome>,
}

impl ActionOutcome {
    fn push(&mut self, outcome: SenderOutcome) {
        if outcome.succeeded() {
            self.succeeded_senders += 1;
        }
        self.processed += outcome.processed;
        self.failed_count += outcome.failed;
        self.details.push(outcome);
    }
}

enum Mutation {
    Modify(LabelChange),
    Trash,
}

/// Applies [`Action`]s in bounded batches.
#[derive(Debug, Clone, Copy)]
pub struct ActionExecutor {
    batch_size: usize,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new(MAX_BATCH_SIZE)
    }
}

impl ActionExecutor {
    /// Creates an executor; the batch size is clamped to the API limit.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
        }
    }

    /// Validates the request and claims the action's busy flag.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty selection, a malformed
    /// sender or label, or [`Error::AlreadyInProgress`](crate::Error::AlreadyInProgress).
    pub fn begin(
        &self,
        states: &StateRegistry,
        action: &Action,
        senders: &[String],
    ) -> Result<RunGuard> {
        if senders.is_empty() {
            return Err(ValidationError::NoSenders.into());
        }
        if senders.iter().any(|s| !is_query_safe(s, false)) {
            return Err(ValidationError::InvalidSender.into());
        }
        if let Some(label) = action.label_name()
            && !is_query_safe(label, true)
        {
            return Err(ValidationError::InvalidLabel.into());
        }
        states.get(action.kind()).try_begin()
    }

    /// Runs an action claimed with [`begin`](Self::begin).
    ///
    /// Message IDs come from `groups`; senders missing there are resolved by
    /// listing `from:<sender>`.
    ///
    /// # Errors
    ///
    /// Returns the transport or auth error that aborted the run, or
    /// [`ValidationError::UnknownLabel`] when removing a missing label.
    pub async fn run<G: Gateway>(
        &self,
        gateway: &G,
        guard: RunGuard,
        action: &Action,
        senders: &[String],
        groups: &[SenderGroup],
    ) -> Result<ActionOutcome> {
        match self.apply(gateway, &guard, action, senders, groups).await {
            Ok(outcome) => {
                guard.complete_action(outcome.clone());
                Ok(outcome)
            }
            Err(err) => {
                guard.abort(&err);
                Err(err)
            }
        }
    }

    /// Claims the action's state and runs it in the current task.
    ///
    /// # Errors
    ///
    /// See [`begin`](Self::begin) and [`run`](Self::run).
    pub async fn run_action<G: Gateway>(
        &self,
        gateway: &G,
        states: &StateRegistry,
        action: &Action,
        senders: &[String],
        groups: &[SenderGroup],
    ) -> Result<ActionOutcome> {
        let guard = self.begin(states, action, senders)?;
        self.run(gateway, guard, action, senders, groups).await
    }

    async fn mutation<G: Gateway>(gateway: &G, action: &Action) -> Result<Mutation> {
        Ok(match action {
            Action::MarkRead => Mutation::Modify(LabelChange::remove(system::UNREAD)),
            Action::Delete => Mutation::Trash,
            Action::Archive => Mutation::Modify(LabelChange::remove(system::INBOX)),
            Action::MarkImportant => Mutation::Modify(LabelChange::add(system::IMPORTANT)),
            Action::ApplyLabel(name) => {
                let label = labels::ensure_label(gateway, name).await?;
                Mutation::Modify(LabelChange::add(label.id))
            }
            Action::RemoveLabel(name) => {
                let label = labels::find_label(gateway, name)
                    .await?
                    .ok_or(ValidationError::UnknownLabel)?;
                Mutation::Modify(LabelChange::remove(label.id))
            }
        })
    }

    async fn apply<G: Gateway>(
        &self,
        gateway: &G,
        guard: &RunGuard,
        action: &Action,
        senders: &[String],
        groups: &[SenderGroup],
    ) -> Result<ActionOutcome> {
        let mutation = Self::mutation(gateway, action).await?;
        let chunk_size = self.batch_size.min(gateway.max_batch_size()).max(1);

        let mut seen = HashSet::new();
        let senders: Vec<String> = senders
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| seen.insert(s.clone()))
            .collect();
        guard.discover(senders.len());

        let mut outcome = ActionOutcome::default();
        for sender in senders {
            guard.set_message(format!("Processing {sender}"));
            let ids = match groups.iter().find(|g| g.sender_email == sender) {
                Some(group) => group.message_ids.iter().cloned().collect(),
                None => {
                    debug!(%sender, "Sender not in scan results, listing messages");
                    collect_message_ids(gateway, &format!("from:{sender}"), None).await?
                }
            };

            let mut result = SenderOutcome {
                sender,
                processed: ids.len(),
                failed: 0,
                error: None,
            };
            if ids.is_empty() {
                result.error = Some("No messages found".to_string());
            }
            for chunk in ids.chunks(chunk_size) {
                let mut failures = 0;
                let on_item = |id: &str, item: mailsweep_gmail::ItemResult<()>| {
                    if let Err(failure) = item {
                        warn!(id, reason = %failure, "Message update failed");
                        failures += 1;
                    }
                };
                match &mutation {
                    Mutation::Modify(change) => gateway.modify_messages(chunk, change, on_item).await?,
                    Mutation::Trash => gateway.trash_messages(chunk, on_item).await?,
                }
                result.failed += failures;
            }
            guard.record_batch(1, result.failed);
            outcome.push(result);
        }

        info!(
            kind = %action.kind(),
            succeeded = outcome.succeeded_senders,
            failed = outcome.failed_count,
            "Action finished"
        );
        Ok(outcome)
    }

    /// Marks up to `limit` unread messages matching `filter` as read.
    ///
    /// Runs under [`OperationKind::MarkRead`]; the outcome has no per-sender
    /// details.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad filter,
    /// [`Error::AlreadyInProgress`](crate::Error::AlreadyInProgress), or the
    /// transport error that aborted the run.
    pub async fn mark_read_matching<G: Gateway>(
        &self,
        gateway: &G,
        states: &StateRegistry,
        filter: &FilterConfig,
        limit: Option<usize>,
    ) -> Result<ActionOutcome> {
        let guard = Self::begin_mark_read(states, filter)?;
        self.run_mark_read(gateway, guard, filter, limit).await
    }

    /// Validates `filter` and claims the mark-read busy flag.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad filter or
    /// [`Error::AlreadyInProgress`](crate::Error::AlreadyInProgress).
    pub fn begin_mark_read(states: &StateRegistry, filter: &FilterConfig) -> Result<RunGuard> {
        filter.validate()?;
        states.get(OperationKind::MarkRead).try_begin()
    }

    /// Runs a mark-read claimed with [`begin_mark_read`](Self::begin_mark_read).
    ///
    /// # Errors
    ///
    /// Returns the transport or auth error that aborted the run.
    pub async fn run_mark_read<G: Gateway>(
        &self,
        gateway: &G,
        guard: RunGuard,
        filter: &FilterConfig,
        limit: Option<usize>,
    ) -> Result<ActionOutcome> {
        match self.mark_read_ids(gateway, &guard, filter, limit).await {
            Ok(outcome) => {
                guard.complete_action(outcome.clone());
                Ok(outcome)
            }
            Err(err) => {
                guard.abort(&err);
                Err(err)
            }
        }
    }

    async fn mark_read_ids<G: Gateway>(
        &self,
        gateway: &G,
        guard: &RunGuard,
        filter: &FilterConfig,
        limit: Option<usize>,
    ) -> Result<ActionOutcome> {
        let query = filter.to_query(&["is:unread"]);
        let ids = collect_message_ids(gateway, &query, limit).await?;
        guard.discover(ids.len());
        info!(%query, messages = ids.len(), "Marking messages read");

        let change = LabelChange::remove(system::UNREAD);
        let chunk_size = self.batch_size.min(gateway.max_batch_size()).max(1);
        let mut outcome = ActionOutcome::default();
        for chunk in ids.chunks(chunk_size) {
            let mut failures = 0;
            gateway
                .modify_messages(chunk, &change, |id, item| {
                    if let Err(failure) = item {
                        warn!(id, reason = %failure, "Message update failed");
                        failures += 1;
                    }
                })
                .await?;
            guard.record_batch(chunk.len(), failures);
            outcome.processed += chunk.len();
            outcome.failed_count += failures;
        }
        Ok(outcome)
    }
}

/// Gmail's estimate of unread messages in the inbox.
///
/// # Errors
///
/// Returns an error if the listing fails.
pub async fn unread_count<G: Gateway>(gateway: &G) -> Result<u32> {
    let page = gateway.list_messages("is:unread in:inbox", None, 1).await?;
    Ok(page.result_size_estimate)
}
