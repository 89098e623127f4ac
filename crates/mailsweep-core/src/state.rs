//! Per-operation progress state shared with pollers.
//!
//! Each [`OperationKind`] owns one [`ScanState`] for the life of the
//! process. Its `busy` flag is an atomic that rejects a second start
//! instead of queueing it. The run that won the flag holds a
//! [`RunGuard`], which is the only writer; pollers read snapshots.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::actions::ActionOutcome;
use crate::error::{Error, Result};
use crate::sender::SenderGroup;
use crate::validation::ValidationError;

/// A named category of long-running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Scan for senders with unsubscribe links.
    UnsubscribeScan,
    /// Scan for senders to clean up.
    DeleteScan,
    /// Mark messages read.
    MarkRead,
    /// Move messages to trash.
    Delete,
    /// Remove messages from the inbox.
    Archive,
    /// Apply or remove a label.
    Label,
    /// Mark messages important.
    MarkImportant,
}

impl OperationKind {
    /// Every kind, in registry order.
    pub const ALL: [Self; 7] = [
        Self::UnsubscribeScan,
        Self::DeleteScan,
        Self::MarkRead,
        Self::Delete,
        Self::Archive,
        Self::Label,
        Self::MarkImportant,
    ];

    /// Stable name used in URLs and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnsubscribeScan => "unsubscribe-scan",
            Self::DeleteScan => "delete-scan",
            Self::MarkRead => "mark-read",
            Self::Delete => "delete",
            Self::Archive => "archive",
            Self::Label => "label",
            Self::MarkImportant => "mark-important",
        }
    }

    /// Returns `true` for kinds that produce sender groups.
    #[must_use]
    pub const fn is_scan(self) -> bool {
        matches!(self, Self::UnsubscribeScan | Self::DeleteScan)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or(ValidationError::WrongOperation)
    }
}

/// Items processed so far out of those discovered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Items handled, successfully or not.
    pub processed: usize,
    /// Items discovered so far.
    pub total: usize,
}

/// Point-in-time view of a [`ScanState`] for pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Operation kind.
    pub kind: OperationKind,
    /// A run is in flight.
    pub busy: bool,
    /// Progress of the current or last run.
    pub progress: Progress,
    /// Items that failed in the current or last run.
    pub failed_count: usize,
    /// Why the last run aborted.
    pub error: Option<String>,
    /// Short description of what is happening.
    pub message: String,
    /// When the last run finished.
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    progress: Progress,
    failed_count: usize,
    error: Option<String>,
    message: String,
    finished_at: Option<DateTime<Utc>>,
    results: Arc<Vec<SenderGroup>>,
    outcome: Option<ActionOutcome>,
}

/// Progress, results and busy flag of one operation kind.
#[derive(Debug)]
pub struct ScanState {
    kind: OperationKind,
    busy: AtomicBool,
    inner: RwLock<Inner>,
}

impl ScanState {
    /// Creates an idle state.
    #[must_use]
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            busy: AtomicBool::new(false),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Operation kind of this state.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Returns `true` while a run is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claims the busy flag and resets progress for a new run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyInProgress`] without touching any state if a
    /// run is already in flight.
    pub fn try_begin(self: &Arc<Self>) -> Result<RunGuard> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyInProgress(self.kind));
        }
        *self.write() = Inner {
            message: "Starting".to_string(),
            ..Inner::default()
        };
        info!(kind = %self.kind, "Operation running");
        Ok(RunGuard {
            state: Arc::clone(self),
            finished: false,
        })
    }

    /// Snapshot for the status read API.
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        let inner = self.read();
        StatusSnapshot {
            kind: self.kind,
            busy: self.is_busy(),
            progress: inner.progress,
            failed_count: inner.failed_count,
            error: inner.error.clone(),
            message: inner.message.clone(),
            finished_at: inner.finished_at,
        }
    }

    /// Sender groups of the last completed scan.
    #[must_use]
    pub fn results(&self) -> Arc<Vec<SenderGroup>> {
        Arc::clone(&self.read().results)
    }

    /// Outcome of the last completed action.
    #[must_use]
    pub fn last_outcome(&self) -> Option<ActionOutcome> {
        self.read().outcome.clone()
    }

    /// Forgets the last run. Does nothing while busy.
    pub fn clear(&self) {
        if !self.is_busy() {
            *self.write() = Inner::default();
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive write handle of the run that owns the busy flag.
///
/// Dropping the guard releases the flag; a guard dropped without
/// [`complete_scan`](Self::complete_scan), [`complete_action`](Self::complete_action)
/// or [`abort`](Self::abort) marks the run as interrupted.
#[derive(Debug)]
pub struct RunGuard {
    state: Arc<ScanState>,
    finished: bool,
}

impl RunGuard {
    /// Operation kind being run.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.state.kind
    }

    /// Raises the discovered total. Never lowers it.
    pub fn discover(&self, total: usize) {
        let mut inner = self.state.write();
        inner.progress.total = inner.progress.total.max(total);
    }

    /// Records one finished batch of `items` with `failures` among them.
    pub fn record_batch(&self, items: usize, failures: usize) {
        let mut inner = self.state.write();
        inner.progress.processed += items;
        inner.progress.total = inner.progress.total.max(inner.progress.processed);
        inner.failed_count += failures;
    }

    /// Updates the status message.
    pub fn set_message(&self, message: impl Into<String>) {
        self.state.write().message = message.into();
    }

    /// Current progress.
    #[must_use]
    pub fn progress(&self) -> Progress {
        self.state.read().progress
    }

    /// Current failure count.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.state.read().failed_count
    }

    /// Publishes scan results and ends the run.
    pub fn complete_scan(mut self, results: Vec<SenderGroup>) {
        let senders = results.len();
        {
            let mut inner = self.state.write();
            inner.message = format!(
                "Found {senders} senders in {} messages",
                inner.progress.processed
            );
            inner.results = Arc::new(results);
            inner.finished_at = Some(Utc::now());
        }
        self.finished = true;
        info!(kind = %self.kind(), senders, "Operation completed");
    }

    /// Publishes an action outcome and ends the run.
    pub fn complete_action(mut self, outcome: ActionOutcome) {
        {
            let mut inner = self.state.write();
            inner.message = format!(
                "Done: {} senders succeeded, {} messages failed",
                outcome.succeeded_senders, outcome.failed_count
            );
            inner.outcome = Some(outcome);
            inner.finished_at = Some(Utc::now());
        }
        self.finished = true;
        info!(kind = %self.kind(), "Operation completed");
    }

    /// Records a whole-run failure and ends the run. Partial results are
    /// discarded.
    pub fn abort(mut self, error: &Error) {
        self.fail(error.to_string());
        self.finished = true;
    }

    fn fail(&self, error: String) {
        warn!(kind = %self.kind(), %error, "Operation aborted");
        let mut inner = self.state.write();
        inner.results = Arc::new(Vec::new());
        inner.outcome = None;
        inner.message = "Aborted".to_string();
        inner.error = Some(error);
        inner.finished_at = Some(Utc::now());
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.fail("Operation interrupted".to_string());
        }
        self.state.busy.store(false, Ordering::Release);
    }
}

/// One [`ScanState`] per operation kind, created up front.
#[derive(Debug, Clone)]
pub struct StateRegistry {
    states: Arc<[Arc<ScanState>]>,
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StateRegistry {
    /// Creates idle states for every kind.
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: OperationKind::ALL
                .into_iter()
                .map(|kind| Arc::new(ScanState::new(kind)))
                .collect(),
        }
    }

    /// State of one kind.
    #[must_use]
    pub fn get(&self, kind: OperationKind) -> &Arc<ScanState> {
        &self.states[kind.index()]
    }

    /// Status of one kind.
    #[must_use]
    pub fn status(&self, kind: OperationKind) -> StatusSnapshot {
        self.get(kind).status()
    }

    /// Results of one kind.
    #[must_use]
    pub fn results(&self, kind: OperationKind) -> Arc<Vec<SenderGroup>> {
        self.get(kind).results()
    }

    /// Returns `true` if any operation is in flight.
    #[must_use]
    pub fn any_busy(&self) -> bool {
        self.busy_kind().is_some()
    }

    /// First operation in flight, if any.
    #[must_use]
    pub fn busy_kind(&self) -> Option<OperationKind> {
        OperationKind::ALL
            .into_iter()
            .find(|&kind| self.get(kind).is_busy())
    }

    /// Clears every idle state (after sign-out).
    pub fn clear_all(&self) {
        for state in self.states.iter() {
            state.clear();
        }
    }
}
