//! Gmail REST client.

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::batch::{self, SubRequest};
use crate::config::{Config, MAX_PAGE_SIZE};
use crate::error::{Error, Result, extract_error_message};
use crate::gateway::{Gateway, ItemFailure, ItemResult, MessageFormat};
use crate::token::{AccessTokenSource, StaticToken};
use crate::types::{
    Label, LabelChange, LabelList, Message, MessageList, NewLabel, Profile, Thread, ThreadList,
};

/// Authenticated client for one mailbox.
#[derive(Debug, Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    config: Config,
    tokens: Arc<dyn AccessTokenSource>,
}

impl GmailClient {
    /// Creates a client for the production API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        Self::with_config(access_token, Config::default())
    }

    /// Creates a client with a custom configuration and a fixed token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the API base
    /// is not an absolute URL.
    pub fn with_config(access_token: impl Into<String>, config: Config) -> Result<Self> {
        Self::with_token_source(Arc::new(StaticToken::new(access_token)), config)
    }

    /// Creates a client that asks `tokens` for the bearer token on every call.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the API base
    /// is not an absolute URL.
    pub fn with_token_source(tokens: Arc<dyn AccessTokenSource>, config: Config) -> Result<Self> {
        reqwest::Url::parse(&config.api_base)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.api_base)))?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    fn url(&self, resource: &str) -> String {
        format!("{}{}/{resource}", self.config.api_base, self.config.user_path())
    }

    fn resource_path(&self, resource: &str) -> String {
        format!("{}/{resource}", self.config.user_path())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(resource);
        let response = self
            .send_authorized(|token| {
                self.http
                    .get(&url)
                    .bearer_auth(token)
                    .header(ACCEPT, "application/json")
                    .query(query)
            })
            .await?;
        Self::handle_response(response).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        resource: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.url(resource);
        let response = self
            .send_authorized(|token| {
                self.http
                    .post(&url)
                    .bearer_auth(token)
                    .header(ACCEPT, "application/json")
                    .json(body)
            })
            .await?;
        Self::handle_response(response).await
    }

    /// Sends a request built around the current token. A 401 renews the
    /// token once and resends.
    async fn send_authorized<R>(&self, request: R) -> Result<reqwest::Response>
    where
        R: Fn(&str) -> reqwest::RequestBuilder,
    {
        let token = self.tokens.access_token().await?;
        let response = request(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        tracing::debug!("Access token rejected, renewing");
        let token = self.tokens.renew(&token).await?;
        Ok(request(&token).send().await?)
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), &text));
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn check_batch_size(&self, size: usize) -> Result<()> {
        let max = self.config.max_batch_size;
        if size > max {
            return Err(Error::BatchTooLarge { size, max });
        }
        Ok(())
    }

    /// Sends one physical batch request and returns a body or failure per
    /// sub-request, in request order.
    ///
    /// A rejected token, for the whole request or any sub-request, is renewed
    /// once and the batch resent.
    async fn execute_batch(&self, requests: &[SubRequest]) -> Result<Vec<ItemResult<String>>> {
        let boundary = batch::new_boundary();
        let body = batch::encode(requests, &boundary);
        tracing::debug!(items = requests.len(), "Sending batch request");

        let mut token = self.tokens.access_token().await?;
        let mut renewed = false;
        loop {
            match self.send_batch(&token, &body, &boundary, requests.len()).await {
                Err(Error::AuthExpired) if !renewed => {
                    tracing::debug!("Batch rejected the access token, renewing");
                    token = self.tokens.renew(&token).await?;
                    renewed = true;
                }
                outcome => return outcome,
            }
        }
    }

    async fn send_batch(
        &self,
        token: &str,
        body: &str,
        boundary: &str,
        expected: usize,
    ) -> Result<Vec<ItemResult<String>>> {
        let response = self
            .http
            .post(self.config.batch_url())
            .bearer_auth(token)
            .header(CONTENT_TYPE, batch::content_type(boundary))
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), &text));
        }

        let response_boundary = batch::boundary_from_content_type(&content_type)?;
        let slots = batch::decode(&text, &response_boundary, expected)?;

        if slots.iter().flatten().any(|s| s.status == 401) {
            tracing::debug!("Batch sub-request rejected the access token");
            return Err(Error::AuthExpired);
        }

        Ok(slots
            .into_iter()
            .map(|slot| match slot {
                Some(sub) if sub.is_success() => Ok(sub.body),
                Some(sub) => Err(ItemFailure::with_status(
                    sub.status,
                    extract_error_message(&sub.body),
                )),
                None => Err(ItemFailure::local("missing from batch response")),
            })
            .collect())
    }

    /// Runs one batch and hands each outcome to `on_item` in submission order.
    async fn run_batch<T, B, P, F>(
        &self,
        ids: &[String],
        build: B,
        parse: P,
        mut on_item: F,
    ) -> Result<()>
    where
        B: Fn(&str) -> SubRequest,
        P: Fn(&str) -> ItemResult<T>,
        F: FnMut(&str, ItemResult<T>),
    {
        if ids.is_empty() {
            return Ok(());
        }
        self.check_batch_size(ids.len())?;

        let requests: Vec<SubRequest> = ids.iter().map(|id| build(id)).collect();
        let outcomes = self.execute_batch(&requests).await?;
        for (id, outcome) in ids.iter().zip(outcomes) {
            on_item(id, outcome.and_then(|body| parse(&body)));
        }
        Ok(())
    }
}

fn parse_item<T: DeserializeOwned>(body: &str) -> ItemResult<T> {
    serde_json::from_str(body).map_err(|e| ItemFailure::local(format!("undecodable item: {e}")))
}

#[allow(clippy::unnecessary_wraps)]
const fn ignore_body(_body: &str) -> ItemResult<()> {
    Ok(())
}

impl Gateway for GmailClient {
    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }

    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessageList> {
        let params = list_params(query, page_token, max_results);
        self.get_json("messages", &params).await
    }

    async fn list_threads(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<ThreadList> {
        let params = list_params(query, page_token, max_results);
        self.get_json("threads", &params).await
    }

    async fn fetch_messages<F>(&self, ids: &[String], format: MessageFormat, on_item: F) -> Result<()>
    where
        F: FnMut(&str, ItemResult<Message>) + Send,
    {
        let query = format.query_string();
        self.run_batch(
            ids,
            |id| SubRequest::get(format!("{}?{query}", self.resource_path(&format!("messages/{id}")))),
            parse_item::<Message>,
            on_item,
        )
        .await
    }

    async fn fetch_threads<F>(&self, ids: &[String], format: MessageFormat, on_item: F) -> Result<()>
    where
        F: FnMut(&str, ItemResult<Thread>) + Send,
    {
        let query = format.query_string();
        self.run_batch(
            ids,
            |id| SubRequest::get(format!("{}?{query}", self.resource_path(&format!("threads/{id}")))),
            parse_item::<Thread>,
            on_item,
        )
        .await
    }

    async fn modify_messages<F>(&self, ids: &[String], change: &LabelChange, on_item: F) -> Result<()>
    where
        F: FnMut(&str, ItemResult<()>) + Send,
    {
        let body = serde_json::to_string(change)?;
        self.run_batch(
            ids,
            |id| {
                SubRequest::post(
                    self.resource_path(&format!("messages/{id}/modify")),
                    Some(body.clone()),
                )
            },
            ignore_body,
            on_item,
        )
        .await
    }

    async fn trash_messages<F>(&self, ids: &[String], on_item: F) -> Result<()>
    where
        F: FnMut(&str, ItemResult<()>) + Send,
    {
        self.run_batch(
            ids,
            |id| SubRequest::post(self.resource_path(&format!("messages/{id}/trash")), None),
            ignore_body,
            on_item,
        )
        .await
    }

    async fn list_labels(&self) -> Result<Vec<Label>> {
        let list: LabelList = self.get_json("labels", &[]).await?;
        Ok(list.labels)
    }

    async fn create_label(&self, name: &str) -> Result<Label> {
        self.post_json("labels", &NewLabel::visible(name)).await
    }

    async fn delete_label(&self, label_id: &str) -> Result<()> {
        let url = self.url(&format!("labels/{label_id}"));
        let response = self
            .send_authorized(|token| self.http.delete(&url).bearer_auth(token))
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            return Err(Error::from_status(status.as_u16(), &text));
        }
        Ok(())
    }

    async fn profile(&self) -> Result<Profile> {
        self.get_json("profile", &[]).await
    }
}

fn list_params(query: &str, page_token: Option<&str>, max_results: u32) -> Vec<(&'static str, String)> {
    let mut params = vec![("maxResults", max_results.clamp(1, MAX_PAGE_SIZE).to_string())];
    if !query.trim().is_empty() {
        params.push(("q", query.trim().to_string()));
    }
    if let Some(token) = page_token {
        params.push(("pageToken", token.to_string()));
    }
    params
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_clamp_and_skip_empty_query() {
        let params = list_params("  ", None, 10_000);
        assert_eq!(params, vec![("maxResults", "500".to_string())]);

        let params = list_params("from:a@b.c", Some("tok"), 0);
        assert_eq!(params[0].1, "1");
        assert!(params.contains(&("q", "from:a@b.c".to_string())));
        assert!(params.contains(&("pageToken", "tok".to_string())));
    }

    #[test]
    fn test_invalid_api_base_rejected() {
        let config = Config::builder().api_base("not a url").build();
        assert!(matches!(
            GmailClient::with_config("t", config),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected_before_io() {
        let config = Config::builder()
            .api_base("http://127.0.0.1:9")
            .max_batch_size(2)
            .build();
        let client = GmailClient::with_config("t", config).unwrap();
        let ids: Vec<String> = (0..3).map(|i| i.to_string()).collect();
        let mut calls = 0;
        let result = client.trash_messages(&ids, |_, _| calls += 1).await;
        assert!(matches!(result, Err(Error::BatchTooLarge { size: 3, max: 2 })));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let client = GmailClient::with_config("t", Config::builder().api_base("http://127.0.0.1:9").build()).unwrap();
        let mut calls = 0;
        client
            .fetch_messages(&[], MessageFormat::Minimal, |_, _| calls += 1)
            .await
            .unwrap();
        assert_eq!(calls, 0);
    }
}
