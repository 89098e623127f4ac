//! HTTP routes.

mod accounts;
mod mailbox;
mod operations;

use axum::Router;
use axum::routing::{delete, get, post};

use crate::app::AppState;

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/scan", post(operations::unsubscribe_scan))
        .route("/api/delete-scan", post(operations::delete_scan))
        .route("/api/status/{kind}", get(operations::status))
        .route("/api/results/{kind}", get(operations::results))
        .route("/api/actions/{action}", post(operations::run_action))
        .route("/api/mark-read-matching", post(operations::mark_read_matching))
        .route("/api/unread-count", get(operations::unread))
        .route("/api/unsubscribe", post(mailbox::unsubscribe))
        .route("/api/process-unsubscribe-label", post(mailbox::process_label))
        .route("/api/labels", get(mailbox::list_labels).post(mailbox::create_label))
        .route("/api/labels/{id}", delete(mailbox::delete_label))
        .route("/api/preview", get(mailbox::preview))
        .route("/api/search-threads", post(mailbox::search))
        .route("/api/export-selected", post(mailbox::export_selected))
        .route("/api/export-threads", post(mailbox::export_query))
        .route("/api/accounts", get(accounts::list))
        .route("/api/accounts/switch", post(accounts::switch))
        .route("/api/accounts/remove", post(accounts::remove))
        .route("/api/sign-out", post(accounts::sign_out))
        .route("/api/auth/sign-in", get(accounts::sign_in))
        .route("/oauth/callback", get(accounts::callback))
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use mailsweep_core::{MemoryTokenStore, OperationKind, Settings, TokenStore};
    use mailsweep_oauth::Token;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn data_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mailsweep-routes-{name}-{}", std::process::id()))
    }

    async fn app_state(name: &str, api_base: &str, signed_in: bool) -> AppState {
        let settings = Settings {
            data_dir: data_dir(name),
            gmail_api_base: api_base.to_string(),
            ..Settings::default()
        };
        let store = Arc::new(MemoryTokenStore::new());
        let state = AppState::new(&settings, Arc::clone(&store) as Arc<dyn TokenStore>)
            .await
            .unwrap();
        if signed_in {
            store.store("me@example.com", &Token::bearer("test-token")).unwrap();
            state.credentials.accounts().add("me@example.com").await.unwrap();
        }
        state
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_status_of_every_kind_starts_idle() {
        let state = app_state("idle", "http://127.0.0.1:9", false).await;
        for kind in OperationKind::ALL {
            let (status, body) = send(&state, get(&format!("/api/status/{kind}"))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["kind"], kind.as_str());
            assert_eq!(body["busy"], false);
        }

        let (status, body) = send(&state, get("/api/status/purge")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_results_reject_action_kinds() {
        let state = app_state("results", "http://127.0.0.1:9", false).await;
        let (status, body) = send(&state, get("/api/results/delete-scan")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (status, _) = send(&state, get("/api/results/archive")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_scan_requires_sign_in() {
        let state = app_state("signed-out", "http://127.0.0.1:9", false).await;
        let (status, _) = send(&state, post_json("/api/scan", &json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(!state.states.any_busy());
    }

    #[tokio::test]
    async fn test_running_scan_rejects_second_start() {
        let state = app_state("busy", "http://127.0.0.1:9", true).await;
        let guard = state.states.get(OperationKind::DeleteScan).try_begin().unwrap();

        let (status, body) = send(&state, post_json("/api/delete-scan", &json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("delete-scan"));

        drop(guard);
        assert!(!state.states.get(OperationKind::DeleteScan).is_busy());
    }

    #[tokio::test]
    async fn test_invalid_filter_is_bad_request() {
        let state = app_state("filter", "http://127.0.0.1:9", true).await;
        let filter = json!({"date_from": "2024-05-01", "date_to": "2024-01-01"});
        let (status, body) = send(&state, post_json("/api/scan", &filter)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "date_from");
        assert!(!state.states.any_busy());
    }

    #[tokio::test]
    async fn test_unknown_action_and_empty_selection() {
        let state = app_state("actions", "http://127.0.0.1:9", true).await;
        let (status, _) =
            send(&state, post_json("/api/actions/shred", &json!({"senders": ["a@x.com"]}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&state, post_json("/api/actions/archive", &json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "senders");

        let (status, _) = send(
            &state,
            post_json("/api/actions/apply-label", &json!({"senders": ["a@x.com"]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_background_scan_publishes_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "m1"}],
                "resultSizeEstimate": 1
            })))
            .mount(&server)
            .await;
        let part = json!({
            "id": "m1",
            "internalDate": "1700000000000",
            "payload": {"headers": [{"name": "From", "value": "News <news@list.example>"}]}
        });
        let body = format!(
            "--b\r\nContent-Type: application/http\r\nContent-ID: <response-item-0>\r\n\r\nHTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{part}\r\n--b--\r\n"
        );
        Mock::given(method("POST"))
            .and(path("/batch/gmail/v1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "multipart/mixed; boundary=b"),
            )
            .mount(&server)
            .await;

        let state = app_state("scan", &server.uri(), true).await;
        let (status, body) = send(&state, post_json("/api/delete-scan", &json!({}))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["kind"], "delete-scan");

        for _ in 0..200 {
            if !state.states.get(OperationKind::DeleteScan).is_busy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let (_, status_body) = send(&state, get("/api/status/delete-scan")).await;
        assert_eq!(status_body["busy"], false);
        assert_eq!(status_body["error"], Value::Null);

        let (_, results) = send(&state, get("/api/results/delete-scan")).await;
        assert_eq!(results[0]["sender_email"], "news@list.example");
        assert_eq!(results[0]["count"], 1);
    }

    #[tokio::test]
    async fn test_sign_out_resets_accounts() {
        let state = app_state("sign-out", "http://127.0.0.1:9", true).await;
        let (status, body) = send(&state, get("/api/accounts")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active"], "me@example.com");

        let (status, body) = send(&state, post_json("/api/sign-out", &json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active"], Value::Null);

        let (status, _) = send(&state, post_json("/api/sign-out", &json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        tokio::fs::remove_dir_all(data_dir("sign-out")).await.ok();
    }

    #[tokio::test]
    async fn test_account_change_waits_for_running_operation() {
        let state = app_state("switch-busy", "http://127.0.0.1:9", true).await;
        state.credentials.accounts().add("other@example.com").await.unwrap();
        state.credentials.accounts().switch("me@example.com").await.unwrap();

        let guard = state.states.get(OperationKind::DeleteScan).try_begin().unwrap();
        let (status, body) = send(
            &state,
            post_json("/api/accounts/switch", &json!({"email": "other@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("delete-scan"));
        let (status, _) = send(&state, post_json("/api/sign-out", &json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = send(
            &state,
            post_json("/api/accounts/remove", &json!({"email": "me@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            state.credentials.accounts().active().await.as_deref(),
            Some("me@example.com")
        );

        // Results published by the run belong to the account it started on.
        guard.complete_scan(Vec::new());
        let (status, body) = send(
            &state,
            post_json("/api/accounts/switch", &json!({"email": "other@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active"], "other@example.com");
        tokio::fs::remove_dir_all(data_dir("switch-busy")).await.ok();
    }

    #[tokio::test]
    async fn test_callback_without_code_is_rejected() {
        let state = app_state("callback", "http://127.0.0.1:9", false).await;
        let (status, _) = send(&state, get("/oauth/callback?error=access_denied")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&state, get("/oauth/callback")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
