//! HTTP-level tests for the Gmail client against a mock server.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mailsweep_gmail::{
    AccessTokenSource, Config, Error, Gateway, GmailClient, LabelChange, MessageFormat,
};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOUNDARY: &str = "batch_resp";

fn client_for(server: &MockServer) -> GmailClient {
    let config = Config::builder().api_base(server.uri()).build();
    GmailClient::with_config("test-token", config).unwrap()
}

/// Hands out `old` until renewed, then `new`.
#[derive(Debug)]
struct RotatingToken {
    renewals: AtomicUsize,
}

impl RotatingToken {
    fn new() -> Arc<Self> {
        Arc::new(Self { renewals: AtomicUsize::new(0) })
    }

    fn current(&self) -> String {
        if self.renewals.load(Ordering::SeqCst) == 0 {
            "old".to_string()
        } else {
            "new".to_string()
        }
    }
}

#[async_trait]
impl AccessTokenSource for RotatingToken {
    async fn access_token(&self) -> mailsweep_gmail::Result<String> {
        Ok(self.current())
    }

    async fn renew(&self, rejected: &str) -> mailsweep_gmail::Result<String> {
        assert_eq!(rejected, "old");
        self.renewals.fetch_add(1, Ordering::SeqCst);
        Ok(self.current())
    }
}

fn rotating_client(server: &MockServer, tokens: &Arc<RotatingToken>) -> GmailClient {
    let config = Config::builder().api_base(server.uri()).build();
    GmailClient::with_token_source(Arc::clone(tokens) as Arc<dyn AccessTokenSource>, config)
        .unwrap()
}

fn part(item: usize, status: u16, body: &str) -> String {
    format!(
        "--{BOUNDARY}\r\nContent-Type: application/http\r\nContent-ID: <response-item-{item}>\r\n\r\nHTTP/1.1 {status} Status\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{body}\r\n"
    )
}

fn batch_response(parts: &[String]) -> ResponseTemplate {
    let body = format!("{}--{BOUNDARY}--\r\n", parts.concat());
    ResponseTemplate::new(200).set_body_raw(
        body.into_bytes(),
        &format!("multipart/mixed; boundary={BOUNDARY}"),
    )
}

fn ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_fetch_reports_every_item_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch/gmail/v1"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_string_contains("Content-ID: <item-2>"))
        .respond_with(batch_response(&[
            part(1, 404, r#"{"error":{"code":404,"message":"Not Found"}}"#),
            part(0, 200, r#"{"id":"a","threadId":"t1","labelIds":["INBOX"]}"#),
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut seen = Vec::new();
    client
        .fetch_messages(&ids(&["a", "b", "c"]), MessageFormat::Metadata, |id, outcome| {
            seen.push((id.to_string(), outcome));
        })
        .await
        .unwrap();

    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].0, "a");
    assert_eq!(seen[0].1.as_ref().unwrap().label_ids, vec!["INBOX"]);
    assert_eq!(seen[1].0, "b");
    let failure = seen[1].1.as_ref().unwrap_err();
    assert_eq!(failure.status, Some(404));
    assert_eq!(failure.reason, "Not Found");
    assert_eq!(seen[2].0, "c");
    assert_eq!(seen[2].1.as_ref().unwrap_err().status, None);
}

#[tokio::test]
async fn test_undecodable_item_is_item_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch/gmail/v1"))
        .respond_with(batch_response(&[part(0, 200, "{not json")]))
        .mount(&server)
        .await;

    let mut failures = 0;
    client_for(&server)
        .fetch_threads(&ids(&["t"]), MessageFormat::Full, |_, outcome| {
            if outcome.is_err() {
                failures += 1;
            }
        })
        .await
        .unwrap();
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn test_sub_response_401_fails_whole_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch/gmail/v1"))
        .respond_with(batch_response(&[
            part(0, 200, "{}"),
            part(1, 401, r#"{"error":{"message":"Invalid Credentials"}}"#),
        ]))
        .mount(&server)
        .await;

    let mut calls = 0;
    let result = client_for(&server)
        .trash_messages(&ids(&["a", "b"]), |_, _| calls += 1)
        .await;
    assert!(matches!(result, Err(Error::AuthExpired)));
    assert_eq!(calls, 0);
}

#[tokio::test]
async fn test_outer_status_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch/gmail/v1"))
        .and(body_string_contains("/trash"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/batch/gmail/v1"))
        .and(body_string_contains("/modify"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Backend Error"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let trash = client.trash_messages(&ids(&["a"]), |_, _| {}).await;
    assert!(matches!(trash, Err(Error::AuthExpired)));

    let modify = client
        .modify_messages(&ids(&["a"]), &LabelChange::remove("UNREAD"), |_, _| {})
        .await;
    match modify {
        Err(Error::Api { status, message }) => {
            assert_eq!(status, 503);
            assert_eq!(message, "Backend Error");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_modify_sends_label_change_per_item() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch/gmail/v1"))
        .and(body_string_contains("POST /gmail/v1/users/me/messages/m1/modify"))
        .and(body_string_contains(r#"{"addLabelIds":["IMPORTANT"]}"#))
        .respond_with(batch_response(&[part(0, 200, r#"{"id":"m1"}"#)]))
        .expect(1)
        .mount(&server)
        .await;

    let mut ok = 0;
    client_for(&server)
        .modify_messages(&ids(&["m1"]), &LabelChange::add("IMPORTANT"), |_, outcome| {
            if outcome.is_ok() {
                ok += 1;
            }
        })
        .await
        .unwrap();
    assert_eq!(ok, 1);
}

#[tokio::test]
async fn test_list_messages_passes_query_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages"))
        .and(query_param("q", "category:promotions"))
        .and(query_param("pageToken", "p2"))
        .and(query_param("maxResults", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "messages": [{"id": "x", "threadId": "tx"}],
            "resultSizeEstimate": 1
        })))
        .mount(&server)
        .await;

    let page = client_for(&server)
        .list_messages("category:promotions", Some("p2"), 100)
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].id, "x");
    assert!(page.next_page_token.is_none());
}

#[tokio::test]
async fn test_labels_roundtrip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/labels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "labels": [
                {"id": "INBOX", "name": "INBOX", "type": "system"},
                {"id": "Label_1", "name": "Receipts", "type": "user"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/gmail/v1/users/me/labels"))
        .and(body_string_contains(r#""name":"Newsletters""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "Label_2", "name": "Newsletters", "type": "user"
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/gmail/v1/users/me/labels/Label_2"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let labels = client.list_labels().await.unwrap();
    assert_eq!(labels.len(), 2);
    assert!(labels[0].is_system());
    assert!(!labels[1].is_system());

    let created = client.create_label("Newsletters").await.unwrap();
    assert_eq!(created.id, "Label_2");
    client.delete_label("Label_2").await.unwrap();
}

#[tokio::test]
async fn test_rejected_token_is_renewed_and_request_resent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages"))
        .and(header("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "messages": [{"id": "m1"}]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let tokens = RotatingToken::new();
    let client = rotating_client(&server, &tokens);
    let page = client.list_messages("", None, 10).await.unwrap();
    assert_eq!(page.messages[0].id, "m1");
    // Later calls use the renewed token straight away.
    client.list_messages("", None, 10).await.unwrap();
    assert_eq!(tokens.renewals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_batch_sub_401_is_renewed_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch/gmail/v1"))
        .and(header("authorization", "Bearer old"))
        .respond_with(batch_response(&[part(0, 401, "{}"), part(1, 200, "{}")]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/batch/gmail/v1"))
        .and(header("authorization", "Bearer new"))
        .respond_with(batch_response(&[part(0, 200, "{}"), part(1, 200, "{}")]))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = RotatingToken::new();
    let mut ok = 0;
    rotating_client(&server, &tokens)
        .trash_messages(&ids(&["a", "b"]), |_, outcome| {
            if outcome.is_ok() {
                ok += 1;
            }
        })
        .await
        .unwrap();
    assert_eq!(ok, 2);
    assert_eq!(tokens.renewals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_renewed_token_rejected_again_is_auth_expired() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch/gmail/v1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let tokens = RotatingToken::new();
    let result = rotating_client(&server, &tokens)
        .trash_messages(&ids(&["a"]), |_, _| {})
        .await;
    assert!(matches!(result, Err(Error::AuthExpired)));
}
