//! Message payloads returned by the `users.messages` endpoints.

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response of `messages.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    /// Message references on this page.
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    /// Token for the next page, absent on the last page.
    #[serde(default)]
    pub next_page_token: Option<String>,
    /// Server estimate of the total result count.
    #[serde(default)]
    pub result_size_estimate: u32,
}

/// A message ID with its thread ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    /// Message ID.
    pub id: String,
    /// Owning thread ID.
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// A Gmail message in `full` or `metadata` format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message ID.
    pub id: String,
    /// Owning thread ID.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Labels currently applied.
    #[serde(default)]
    pub label_ids: Vec<String>,
    /// Short plain-text preview.
    #[serde(default)]
    pub snippet: Option<String>,
    /// Milliseconds since the epoch, as a decimal string.
    #[serde(default)]
    pub internal_date: Option<String>,
    /// Estimated size in bytes.
    #[serde(default)]
    pub size_estimate: Option<u64>,
    /// MIME tree.
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

/// One node of the MIME tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    /// MIME type of this part.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Headers of this part (top-level part carries the message headers).
    #[serde(default)]
    pub headers: Vec<Header>,
    /// Inline body data.
    #[serde(default)]
    pub body: Option<PartBody>,
    /// Child parts of a multipart node.
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

/// A single header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name as sent.
    pub name: String,
    /// Raw header value.
    pub value: String,
}

/// Body of a message part.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    /// Base64url-encoded content.
    #[serde(default)]
    pub data: Option<String>,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
}

impl Message {
    /// Case-insensitive lookup of a top-level header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload.as_ref().and_then(|p| p.header(name))
    }

    /// Time Gmail received the message.
    #[must_use]
    pub fn internal_date(&self) -> Option<DateTime<Utc>> {
        let millis = self.internal_date.as_deref()?.parse::<i64>().ok()?;
        DateTime::from_timestamp_millis(millis)
    }

    /// Receive time, falling back to the `Date` header.
    #[must_use]
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.internal_date().or_else(|| {
            self.header("Date")
                .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
                .map(|d| d.with_timezone(&Utc))
        })
    }

    /// Decoded body of the first part with the given MIME type.
    #[must_use]
    pub fn body_of_type(&self, mime_type: &str) -> Option<String> {
        self.payload.as_ref().and_then(|p| p.find_body(mime_type))
    }

    /// Readable body: `text/plain` if present, otherwise `text/html`.
    #[must_use]
    pub fn body_text(&self) -> String {
        let Some(payload) = &self.payload else {
            return String::new();
        };
        if payload.parts.is_empty() {
            return payload.decoded_body().unwrap_or_default();
        }
        payload
            .find_body("text/plain")
            .or_else(|| payload.find_body("text/html"))
            .unwrap_or_default()
    }
}

impl MessagePart {
    /// Case-insensitive header lookup on this part.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Decoded inline body of this part.
    #[must_use]
    pub fn decoded_body(&self) -> Option<String> {
        let data = self.body.as_ref()?.data.as_deref()?;
        decode_base64url(data)
    }

    /// Depth-first search for a part of the given MIME type with a body.
    #[must_use]
    pub fn find_body(&self, mime_type: &str) -> Option<String> {
        let matches = self
            .mime_type
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case(mime_type));
        if matches && let Some(body) = self.decoded_body() {
            return Some(body);
        }
        self.parts.iter().find_map(|p| p.find_body(mime_type))
    }
}

/// Decodes Gmail's base64url body data, with or without padding.
#[must_use]
pub fn decode_base64url(data: &str) -> Option<String> {
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed.trim_end_matches('='))
        .or_else(|_| URL_SAFE.decode(trimmed))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}
