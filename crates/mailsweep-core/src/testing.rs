//! Scripted in-memory gateway for engine and executor tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use mailsweep_gmail::{
    Error, Gateway, Header, ItemFailure, ItemResult, Label, LabelChange, LabelType, Message,
    MessageFormat, MessageList, MessagePart, MessageRef, Profile, Result, Thread, ThreadList,
    ThreadRef,
};

/// A message from `from` with a subject naming its ID.
pub fn fake_message(id: &str, from: &str) -> Message {
    Message {
        id: id.to_string(),
        thread_id: Some(format!("t{id}")),
        snippet: Some(format!("snippet {id}")),
        internal_date: Some("1704067200000".to_string()),
        payload: Some(MessagePart {
            headers: vec![
                Header {
                    name: "From".into(),
                    value: from.into(),
                },
                Header {
                    name: "Subject".into(),
                    value: format!("Subject {id}"),
                },
            ],
            ..MessagePart::default()
        }),
        ..Message::default()
    }
}

enum Scripted {
    Transport(String),
    Auth,
}

#[derive(Default)]
struct Script {
    pages: Vec<Vec<String>>,
    query_pages: HashMap<String, Vec<String>>,
    thread_pages: Vec<Vec<String>>,
    messages: HashMap<String, Message>,
    threads: HashMap<String, Thread>,
    failing: HashSet<String>,
    labels: Vec<Label>,
    next_error: Option<Scripted>,
    queries: Vec<String>,
    fetch_formats: Vec<MessageFormat>,
    modifications: Vec<(Vec<String>, LabelChange)>,
    trashed: Vec<Vec<String>>,
    created_labels: Vec<String>,
    deleted_labels: Vec<String>,
    max_batch: usize,
}

/// Gateway double with scripted listings and recorded mutations.
pub struct FakeGateway {
    script: Mutex<Script>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                max_batch: 100,
                ..Script::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a page to the default message listing.
    pub fn push_page(&self, ids: Vec<String>) {
        self.lock().pages.push(ids);
    }

    /// Single-page listing returned for exactly this query.
    pub fn set_query_page(&self, query: &str, ids: Vec<String>) {
        self.lock().query_pages.insert(query.to_string(), ids);
    }

    pub fn push_thread_page(&self, ids: Vec<String>) {
        self.lock().thread_pages.push(ids);
    }

    pub fn add_message(&self, message: Message) {
        self.lock().messages.insert(message.id.clone(), message);
    }

    pub fn add_thread(&self, thread: Thread) {
        self.lock().threads.insert(thread.id.clone(), thread);
    }

    pub fn add_label(&self, id: &str, name: &str, label_type: LabelType) {
        self.lock().labels.push(Label {
            id: id.into(),
            name: name.into(),
            label_type,
            messages_total: None,
        });
    }

    /// Makes every batch item with this ID fail.
    pub fn fail_item(&self, id: &str) {
        self.lock().failing.insert(id.to_string());
    }

    /// Fails the next call of any kind as a transport error.
    pub fn fail_next_call(&self, message: &str) {
        self.lock().next_error = Some(Scripted::Transport(message.to_string()));
    }

    /// Fails the next call of any kind with stale credentials.
    pub fn fail_next_with_auth(&self) {
        self.lock().next_error = Some(Scripted::Auth);
    }

    pub fn queries(&self) -> Vec<String> {
        self.lock().queries.clone()
    }

    pub fn fetch_formats(&self) -> Vec<MessageFormat> {
        self.lock().fetch_formats.clone()
    }

    pub fn modifications(&self) -> Vec<(Vec<String>, LabelChange)> {
        self.lock().modifications.clone()
    }

    pub fn trashed(&self) -> Vec<Vec<String>> {
        self.lock().trashed.clone()
    }

    pub fn created_labels(&self) -> Vec<String> {
        self.lock().created_labels.clone()
    }

    pub fn deleted_labels(&self) -> Vec<String> {
        self.lock().deleted_labels.clone()
    }

    fn take_error(script: &mut Script) -> Result<()> {
        match script.next_error.take() {
            None => Ok(()),
            Some(Scripted::Auth) => Err(Error::AuthExpired),
            Some(Scripted::Transport(message)) => Err(Error::Api {
                status: 503,
                message,
            }),
        }
    }

    fn check_batch(script: &mut Script, ids: &[String]) -> Result<()> {
        Self::take_error(script)?;
        if ids.len() > script.max_batch {
            return Err(Error::BatchTooLarge {
                size: ids.len(),
                max: script.max_batch,
            });
        }
        Ok(())
    }

    fn item_outcome(script: &Script, id: &str) -> ItemResult<()> {
        if script.failing.contains(id) {
            Err(ItemFailure::with_status(500, "Backend Error"))
        } else {
            Ok(())
        }
    }
}

fn page_of(pages: &[Vec<String>], page_token: Option<&str>) -> (Vec<String>, Option<String>) {
    let index = page_token
        .and_then(|t| t.strip_prefix("page-"))
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(0);
    let ids = pages.get(index).cloned().unwrap_or_default();
    let next = (index + 1 < pages.len()).then(|| format!("page-{}", index + 1));
    (ids, next)
}

#[allow(clippy::cast_possible_truncation)]
fn estimate(pages: &[Vec<String>]) -> u32 {
    pages.iter().map(Vec::len).sum::<usize>() as u32
}

impl Gateway for FakeGateway {
    fn max_batch_size(&self) -> usize {
        self.lock().max_batch
    }

    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessageList> {
        let mut script = self.lock();
        Self::take_error(&mut script)?;
        script.queries.push(query.to_string());
        let (mut ids, next) = if let Some(ids) = script.query_pages.get(query) {
            (ids.clone(), None)
        } else {
            page_of(&script.pages, page_token)
        };
        let total = script
            .query_pages
            .get(query)
            .map_or_else(|| estimate(&script.pages), |ids| estimate(std::slice::from_ref(ids)));
        ids.truncate(max_results as usize);
        Ok(MessageList {
            messages: ids
                .into_iter()
                .map(|id| MessageRef { id, thread_id: None })
                .collect(),
            next_page_token: next,
            result_size_estimate: total,
        })
    }

    async fn list_threads(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<ThreadList> {
        let mut script = self.lock();
        Self::take_error(&mut script)?;
        script.queries.push(query.to_string());
        let (mut ids, next) = page_of(&script.thread_pages, page_token);
        ids.truncate(max_results as usize);
        Ok(ThreadList {
            threads: ids
                .into_iter()
                .map(|id| ThreadRef { id, snippet: None })
                .collect(),
            next_page_token: next,
            result_size_estimate: estimate(&script.thread_pages),
        })
    }

    async fn fetch_messages<F>(&self, ids: &[String], format: MessageFormat, mut on_item: F) -> Result<()>
    where
        F: FnMut(&str, ItemResult<Message>) + Send,
    {
        let outcomes: Vec<ItemResult<Message>> = {
            let mut script = self.lock();
            Self::check_batch(&mut script, ids)?;
            script.fetch_formats.push(format);
            ids.iter()
                .map(|id| {
                    Self::item_outcome(&script, id)?;
                    script
                        .messages
                        .get(id)
                        .cloned()
                        .ok_or_else(|| ItemFailure::with_status(404, "Requested entity was not found."))
                })
                .collect()
        };
        for (id, outcome) in ids.iter().zip(outcomes) {
            on_item(id, outcome);
        }
        Ok(())
    }

    async fn fetch_threads<F>(&self, ids: &[String], _format: MessageFormat, mut on_item: F) -> Result<()>
    where
        F: FnMut(&str, ItemResult<Thread>) + Send,
    {
        let outcomes: Vec<ItemResult<Thread>> = {
            let mut script = self.lock();
            Self::check_batch(&mut script, ids)?;
            ids.iter()
                .map(|id| {
                    Self::item_outcome(&script, id)?;
                    script
                        .threads
                        .get(id)
                        .cloned()
                        .ok_or_else(|| ItemFailure::with_status(404, "Requested entity was not found."))
                })
                .collect()
        };
        for (id, outcome) in ids.iter().zip(outcomes) {
            on_item(id, outcome);
        }
        Ok(())
    }

    async fn modify_messages<F>(&self, ids: &[String], change: &LabelChange, mut on_item: F) -> Result<()>
    where
        F: FnMut(&str, ItemResult<()>) + Send,
    {
        let outcomes: Vec<ItemResult<()>> = {
            let mut script = self.lock();
            Self::check_batch(&mut script, ids)?;
            script.modifications.push((ids.to_vec(), change.clone()));
            ids.iter().map(|id| Self::item_outcome(&script, id)).collect()
        };
        for (id, outcome) in ids.iter().zip(outcomes) {
            on_item(id, outcome);
        }
        Ok(())
    }

    async fn trash_messages<F>(&self, ids: &[String], mut on_item: F) -> Result<()>
    where
        F: FnMut(&str, ItemResult<()>) + Send,
    {
        let outcomes: Vec<ItemResult<()>> = {
            let mut script = self.lock();
            Self::check_batch(&mut script, ids)?;
            script.trashed.push(ids.to_vec());
            ids.iter().map(|id| Self::item_outcome(&script, id)).collect()
        };
        for (id, outcome) in ids.iter().zip(outcomes) {
            on_item(id, outcome);
        }
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<Label>> {
        let mut script = self.lock();
        Self::take_error(&mut script)?;
        Ok(script.labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<Label> {
        let mut script = self.lock();
        Self::take_error(&mut script)?;
        script.created_labels.push(name.to_string());
        let label = Label {
            id: format!("Label_{}", script.labels.len() + 1),
            name: name.to_string(),
            label_type: LabelType::User,
            messages_total: None,
        };
        script.labels.push(label.clone());
        Ok(label)
    }

    async fn delete_label(&self, label_id: &str) -> Result<()> {
        let mut script = self.lock();
        Self::take_error(&mut script)?;
        script.deleted_labels.push(label_id.to_string());
        script.labels.retain(|l| l.id != label_id);
        Ok(())
    }

    async fn profile(&self) -> Result<Profile> {
        let mut script = self.lock();
        Self::take_error(&mut script)?;
        Ok(Profile {
            email_address: "me@example.com".to_string(),
            ..Profile::default()
        })
    }
}
