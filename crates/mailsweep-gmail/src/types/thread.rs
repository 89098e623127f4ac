//! Thread payloads returned by the `users.threads` endpoints.

use serde::{Deserialize, Serialize};

use super::Message;

/// Response of `threads.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadList {
    /// Thread references on this page.
    #[serde(default)]
    pub threads: Vec<ThreadRef>,
    /// Token for the next page, absent on the last page.
    #[serde(default)]
    pub next_page_token: Option<String>,
    /// Server estimate of the total result count.
    #[serde(default)]
    pub result_size_estimate: u32,
}

/// Thread reference from a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRef {
    /// Thread ID.
    pub id: String,
    /// Snippet of the latest message.
    #[serde(default)]
    pub snippet: Option<String>,
}

/// A thread with its messages, oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Thread ID.
    pub id: String,
    /// Snippet of the latest message.
    #[serde(default)]
    pub snippet: Option<String>,
    /// Messages in the thread.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Thread {
    /// First message of the thread, which carries the original subject.
    #[must_use]
    pub fn first_message(&self) -> Option<&Message> {
        self.messages.first()
    }

    /// Most recent message of the thread.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}
