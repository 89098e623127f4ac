//! Typed Gmail API payloads.

mod label;
mod message;
mod thread;

pub use label::{Label, LabelChange, LabelList, LabelType, NewLabel, system};
pub use message::{
    Header, Message, MessageList, MessagePart, MessageRef, PartBody, decode_base64url,
};
pub use thread::{Thread, ThreadList, ThreadRef};

use serde::Deserialize;

/// Response of `users.getProfile`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Address of the authenticated mailbox.
    pub email_address: String,
    /// Total messages in the mailbox.
    #[serde(default)]
    pub messages_total: u64,
    /// Total threads in the mailbox.
    #[serde(default)]
    pub threads_total: u64,
}
