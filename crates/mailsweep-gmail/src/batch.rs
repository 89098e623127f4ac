//! `multipart/mixed` codec for the Gmail batch endpoint.
//!
//! Each sub-request is an `application/http` part tagged with
//! `Content-ID: <item-N>`. Google echoes the tag back as
//! `<response-item-N>`, which is how responses are matched to requests;
//! untagged parts fall back to their position in the body.

use std::fmt::Write as _;

use crate::error::{Error, Result};

/// One HTTP call carried inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubRequest {
    /// HTTP method.
    pub method: &'static str,
    /// Absolute path with query string, e.g. `/gmail/v1/users/me/messages/x`.
    pub path: String,
    /// JSON body, if any.
    pub body: Option<String>,
}

impl SubRequest {
    /// A bodiless GET.
    #[must_use]
    pub const fn get(path: String) -> Self {
        Self {
            method: "GET",
            path,
            body: None,
        }
    }

    /// A POST with an optional JSON body.
    #[must_use]
    pub const fn post(path: String, body: Option<String>) -> Self {
        Self {
            method: "POST",
            path,
            body,
        }
    }
}

/// Status and body of one answered sub-request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubResponse {
    /// HTTP status of the sub-response.
    pub status: u16,
    /// Raw body, trimmed.
    pub body: String,
}

impl SubResponse {
    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Generates a boundary that cannot collide with JSON bodies we send.
#[must_use]
pub fn new_boundary() -> String {
    format!("batch_mailsweep_{:016x}", rand::random::<u64>())
}

/// Content type header value for a batch body with this boundary.
#[must_use]
pub fn content_type(boundary: &str) -> String {
    format!("multipart/mixed; boundary={boundary}")
}

/// Serializes sub-requests into a batch body.
#[must_use]
pub fn encode(requests: &[SubRequest], boundary: &str) -> String {
    let mut out = String::new();
    for (index, request) in requests.iter().enumerate() {
        let _ = write!(out, "--{boundary}\r\n");
        out.push_str("Content-Type: application/http\r\n");
        let _ = write!(out, "Content-ID: <item-{index}>\r\n\r\n");
        let _ = write!(out, "{} {}\r\n", request.method, request.path);
        match &request.body {
            Some(body) => {
                out.push_str("Content-Type: application/json; charset=UTF-8\r\n");
                let _ = write!(out, "Content-Length: {}\r\n\r\n", body.len());
                out.push_str(body);
                out.push_str("\r\n");
            }
            None => out.push_str("\r\n"),
        }
    }
    let _ = write!(out, "--{boundary}--\r\n");
    out
}

/// Reads the `boundary` parameter of a `multipart/mixed` content type.
pub fn boundary_from_content_type(content_type: &str) -> Result<String> {
    content_type
        .split(';')
        .find_map(|param| {
            let (key, value) = param.trim().split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("boundary")
                .then(|| value.trim().trim_matches('"').to_string())
        })
        .filter(|b| !b.is_empty())
        .ok_or_else(|| Error::Protocol(format!("no boundary in content type `{content_type}`")))
}

/// Splits a batch response into one slot per request.
///
/// A slot is `None` when the response carried no part for that request.
pub fn decode(body: &str, boundary: &str, expected: usize) -> Result<Vec<Option<SubResponse>>> {
    let body = body.replace("\r\n", "\n");
    let delimiter = format!("--{boundary}");
    if !body.contains(&delimiter) {
        return Err(Error::Protocol("batch response has no parts".to_string()));
    }

    let mut slots: Vec<Option<SubResponse>> = vec![None; expected];
    let mut position = 0usize;

    for raw in body.split(&delimiter).skip(1) {
        if raw.starts_with("--") {
            break;
        }
        let raw = raw.trim_start_matches('\n');
        if raw.trim().is_empty() {
            continue;
        }
        let (part_headers, http) = split_head(raw);
        let index = content_id_index(part_headers).unwrap_or(position);
        position += 1;

        let Some(response) = parse_http(http) else {
            tracing::debug!(index, "Skipping batch part without a status line");
            continue;
        };
        if let Some(slot) = slots.get_mut(index)
            && slot.is_none()
        {
            *slot = Some(response);
        }
    }

    Ok(slots)
}

/// Splits a block into its header section and the remainder.
fn split_head(block: &str) -> (&str, &str) {
    block.split_once("\n\n").unwrap_or((block, ""))
}

/// Parses `Content-ID: <response-item-N>` into `N`.
fn content_id_index(headers: &str) -> Option<usize> {
    headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case("content-id") {
            return None;
        }
        let id = value.trim().trim_start_matches('<').trim_end_matches('>');
        let id = id.strip_prefix("response-").unwrap_or(id);
        id.strip_prefix("item-")?.parse().ok()
    })
}

/// Parses an embedded `HTTP/1.1 200 OK` message.
fn parse_http(message: &str) -> Option<SubResponse> {
    let (head, body) = split_head(message.trim_start());
    let status = head
        .lines()
        .next()?
        .split_whitespace()
        .nth(1)?
        .parse::<u16>()
        .ok()?;
    Some(SubResponse {
        status,
        body: body.trim().to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn part(content_id: Option<&str>, status: u16, body: &str) -> String {
        let id = content_id.map_or_else(String::new, |id| format!("Content-ID: <{id}>\r\n"));
        format!(
            "--b\r\nContent-Type: application/http\r\n{id}\r\nHTTP/1.1 {status} X\r\nContent-Type: application/json\r\n\r\n{body}\r\n"
        )
    }

    #[test]
    fn test_encode_tags_each_part() {
        let requests = vec![
            SubRequest::get("/gmail/v1/users/me/messages/a?format=minimal".into()),
            SubRequest::post(
                "/gmail/v1/users/me/messages/b/modify".into(),
                Some(r#"{"removeLabelIds":["UNREAD"]}"#.into()),
            ),
        ];
        let body = encode(&requests, "xyz");
        assert!(body.starts_with("--xyz\r\n"));
        assert!(body.contains("Content-ID: <item-0>"));
        assert!(body.contains("Content-ID: <item-1>"));
        assert!(body.contains("GET /gmail/v1/users/me/messages/a?format=minimal\r\n"));
        assert!(body.contains("Content-Length: 29\r\n"));
        assert!(body.ends_with("--xyz--\r\n"));
    }

    #[test]
    fn test_boundary_from_content_type() {
        assert_eq!(
            boundary_from_content_type("multipart/mixed; boundary=batch_abc").unwrap(),
            "batch_abc"
        );
        assert_eq!(
            boundary_from_content_type(r#"multipart/mixed; charset=utf-8; BOUNDARY="q""#).unwrap(),
            "q"
        );
        assert!(boundary_from_content_type("application/json").is_err());
    }

    #[test]
    fn test_decode_matches_by_content_id() {
        let body = format!(
            "{}{}--b--\r\n",
            part(Some("response-item-1"), 404, r#"{"error":{"message":"gone"}}"#),
            part(Some("response-item-0"), 200, r#"{"id":"a"}"#),
        );
        let slots = decode(&body, "b", 2).unwrap();
        assert_eq!(slots[0].as_ref().unwrap().status, 200);
        assert_eq!(slots[0].as_ref().unwrap().body, r#"{"id":"a"}"#);
        assert_eq!(slots[1].as_ref().unwrap().status, 404);
    }

    #[test]
    fn test_decode_falls_back_to_position() {
        let body = format!(
            "{}{}--b--",
            part(None, 200, "{}"),
            part(None, 500, "{}")
        );
        let slots = decode(&body, "b", 3).unwrap();
        assert_eq!(slots[0].as_ref().unwrap().status, 200);
        assert_eq!(slots[1].as_ref().unwrap().status, 500);
        assert!(slots[2].is_none());
    }

    #[test]
    fn test_decode_ignores_out_of_range_ids() {
        let body = format!("{}--b--", part(Some("response-item-7"), 200, "{}"));
        let slots = decode(&body, "b", 1).unwrap();
        assert!(slots[0].is_none());
    }

    #[test]
    fn test_decode_leaves_garbled_part_empty() {
        let body = "--b\r\nContent-ID: <response-item-0>\r\n\r\nnot http\r\n--b--";
        let slots = decode(body, "b", 1).unwrap();
        assert!(slots[0].is_none());
    }

    #[test]
    fn test_decode_without_parts_is_protocol_error() {
        assert!(matches!(decode("nothing", "b", 1), Err(Error::Protocol(_))));
    }

    proptest! {
        #[test]
        fn prop_every_slot_filled_when_all_parts_present(statuses in prop::collection::vec(200u16..600, 1..40)) {
            let mut body = String::new();
            for (i, status) in statuses.iter().enumerate().rev() {
                body.push_str(&part(Some(&format!("response-item-{i}")), *status, "{}"));
            }
            body.push_str("--b--\r\n");
            let slots = decode(&body, "b", statuses.len()).unwrap();
            prop_assert_eq!(slots.len(), statuses.len());
            for (slot, status) in slots.iter().zip(&statuses) {
                prop_assert_eq!(slot.as_ref().map(|s| s.status), Some(*status));
            }
        }
    }
}
