//! Label payloads and label mutation requests.

use serde::{Deserialize, Serialize};

/// Well-known system label IDs used by the mutations.
pub mod system {
    /// Inbox membership; removing it archives a message.
    pub const INBOX: &str = "INBOX";
    /// Unread marker.
    pub const UNREAD: &str = "UNREAD";
    /// Importance marker.
    pub const IMPORTANT: &str = "IMPORTANT";
    /// Trash folder.
    pub const TRASH: &str = "TRASH";
}

/// Whether a label is owned by Gmail or by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelType {
    /// Built-in label such as `INBOX`.
    System,
    /// User-created label.
    #[default]
    User,
}

/// A Gmail label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    /// Label ID used in mutations.
    pub id: String,
    /// Display name; nested labels use `/`.
    pub name: String,
    /// Owner of the label.
    #[serde(default, rename = "type")]
    pub label_type: LabelType,
    /// Total messages carrying the label, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages_total: Option<u64>,
}

impl Label {
    /// Returns `true` for Gmail-owned labels.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.label_type == LabelType::System
    }
}

/// Response of `labels.list`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelList {
    /// All labels of the mailbox.
    #[serde(default)]
    pub labels: Vec<Label>,
}

/// Body of `labels.create`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLabel {
    /// Display name.
    pub name: String,
    /// `labelShow` or `labelHide`.
    pub label_list_visibility: String,
    /// `show` or `hide`.
    pub message_list_visibility: String,
}

impl NewLabel {
    /// A visible user label.
    #[must_use]
    pub fn visible(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label_list_visibility: "labelShow".to_string(),
            message_list_visibility: "show".to_string(),
        }
    }
}

/// Labels to add and remove on a message (body of `messages.modify`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelChange {
    /// Label IDs to add.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub add_label_ids: Vec<String>,
    /// Label IDs to remove.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remove_label_ids: Vec<String>,
}

impl LabelChange {
    /// Adds a single label.
    #[must_use]
    pub fn add(label_id: impl Into<String>) -> Self {
        Self {
            add_label_ids: vec![label_id.into()],
            remove_label_ids: Vec::new(),
        }
    }

    /// Removes a single label.
    #[must_use]
    pub fn remove(label_id: impl Into<String>) -> Self {
        Self {
            add_label_ids: Vec::new(),
            remove_label_ids: vec![label_id.into()],
        }
    }
}
