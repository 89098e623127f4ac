//! Finding and following unsubscribe links.
//!
//! Links come from the `List-Unsubscribe` header when present and
//! otherwise from an unsubscribe-looking hyperlink in the body. Following a
//! link is guarded against requests to local or private addresses, and the
//! request connects only to the addresses that passed the check.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::LazyLock;
use std::time::Duration;

use mailsweep_gmail::{Gateway, LabelChange, Message, MessageFormat};
use regex::Regex;
use reqwest::Url;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::labels;
use crate::scan::collect_message_ids;
use crate::validation::ValidationError;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; mailsweep/0.1)";
const ONE_CLICK_BODY: &str = "List-Unsubscribe=One-Click";

#[allow(clippy::expect_used)]
static HEADER_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\s*([^>\s]+)\s*>").expect("valid regex"));
#[allow(clippy::expect_used)]
static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#)
        .expect("valid regex")
});
#[allow(clippy::expect_used)]
static PLAIN_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>]*(?:unsubscribe|opt-?out)[^\s"'<>]*"#)
        .expect("valid regex")
});

/// Where and how a sender can be unsubscribed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsubscribeLink {
    /// HTTP(S) target.
    pub url: Option<String>,
    /// `mailto:` target.
    pub mailto: Option<String>,
    /// Sender supports RFC 8058 one-click POST.
    pub one_click: bool,
    /// Found in `List-Unsubscribe` rather than the body.
    pub from_header: bool,
}

impl UnsubscribeLink {
    /// Preferred target: the web link, else the mailto.
    #[must_use]
    pub fn preferred(&self) -> Option<&str> {
        self.url.as_deref().or(self.mailto.as_deref())
    }
}

/// Extracts the unsubscribe target of a message.
#[must_use]
pub fn extract(message: &Message) -> Option<UnsubscribeLink> {
    if let Some(header) = message.header("List-Unsubscribe")
        && let Some(mut link) = parse_list_unsubscribe(header)
    {
        link.one_click = link.url.is_some()
            && message
                .header("List-Unsubscribe-Post")
                .is_some_and(|v| v.to_ascii_lowercase().contains("one-click"));
        return Some(link);
    }
    let html = message.body_of_type("text/html");
    let text = message.body_text();
    find_body_link(html.as_deref().unwrap_or(&text)).map(|url| UnsubscribeLink {
        url: Some(url),
        mailto: None,
        one_click: false,
        from_header: false,
    })
}

/// Parses `<https://…>, <mailto:…>` into a link, preferring HTTPS.
#[must_use]
pub fn parse_list_unsubscribe(header: &str) -> Option<UnsubscribeLink> {
    let mut https = None;
    let mut http = None;
    let mut mailto = None;
    for capture in HEADER_ENTRY.captures_iter(header) {
        let target = capture[1].to_string();
        let lower = target.to_ascii_lowercase();
        if lower.starts_with("https://") {
            https.get_or_insert(target);
        } else if lower.starts_with("http://") {
            http.get_or_insert(target);
        } else if lower.starts_with("mailto:") {
            mailto.get_or_insert(target);
        }
    }
    let url = https.or(http);
    (url.is_some() || mailto.is_some()).then_some(UnsubscribeLink {
        url,
        mailto,
        one_click: false,
        from_header: true,
    })
}

/// Best-effort scan of a body for an unsubscribe hyperlink.
#[must_use]
pub fn find_body_link(body: &str) -> Option<String> {
    let is_unsubscribe = |s: &str| {
        let s = s.to_ascii_lowercase();
        s.contains("unsubscribe") || s.contains("opt-out") || s.contains("opt out")
    };
    ANCHOR
        .captures_iter(body)
        .find(|c| {
            let href = &c[1];
            href.to_ascii_lowercase().starts_with("http") && (is_unsubscribe(href) || is_unsubscribe(&c[2]))
        })
        .map(|c| c[1].replace("&amp;", "&"))
        .or_else(|| PLAIN_URL.find(body).map(|m| m.as_str().to_string()))
}

/// Returns `true` for addresses a remote link must never reach.
#[must_use]
pub fn is_forbidden_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_forbidden_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_forbidden_v4(mapped);
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

fn is_forbidden_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip.octets()[0] == 0
        || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64)
}

/// Outcome of one unsubscribe attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsubscribeResult {
    /// The sender is (probably) unsubscribed.
    pub success: bool,
    /// `post`, `get` or `mailto`.
    pub method: &'static str,
    /// User-facing message.
    pub message: String,
}

/// A link whose target passed the address check.
#[derive(Debug)]
struct CheckedLink {
    url: Url,
    /// Resolved addresses of a host name; empty for IP literals and when
    /// private hosts are allowed.
    pinned: Vec<SocketAddr>,
}

fn client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(USER_AGENT)
}

/// Follows unsubscribe links over HTTP.
#[derive(Debug, Clone)]
pub struct Unsubscriber {
    http: reqwest::Client,
    allow_private: bool,
}

impl Unsubscriber {
    /// Creates an unsubscriber with a 10 second timeout and no redirects.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        let http = client_builder()
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self {
            http,
            allow_private: false,
        })
    }

    /// Permits loopback and private targets. Only for tests against a
    /// local server.
    #[must_use]
    pub const fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private = allow;
        self
    }

    /// Checks scheme and resolved addresses of a link.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidLink`] for non-HTTP links and
    /// [`ValidationError::UnsafeLink`] for local or private targets.
    pub async fn check_link(&self, link: &str) -> Result<Url> {
        Ok(self.resolve_link(link).await?.url)
    }

    async fn resolve_link(&self, link: &str) -> Result<CheckedLink> {
        let url = Url::parse(link.trim()).map_err(|_| ValidationError::InvalidLink)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidLink.into());
        }
        let host = url.host_str().ok_or(ValidationError::InvalidLink)?;
        if self.allow_private {
            return Ok(CheckedLink {
                url,
                pinned: Vec::new(),
            });
        }
        if host.eq_ignore_ascii_case("localhost") || host.to_ascii_lowercase().ends_with(".localhost") {
            return Err(ValidationError::UnsafeLink.into());
        }
        let port = url.port_or_known_default().unwrap_or(443);
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            if is_forbidden_ip(ip) {
                return Err(ValidationError::UnsafeLink.into());
            }
            return Ok(CheckedLink {
                url,
                pinned: Vec::new(),
            });
        }
        let pinned: Vec<SocketAddr> = tokio::net::lookup_host((bare, port))
            .await
            .map_err(|e| {
                debug!(host, error = %e, "Unsubscribe host did not resolve");
                ValidationError::InvalidLink
            })?
            .collect();
        if pinned.is_empty() || pinned.iter().any(|addr| is_forbidden_ip(addr.ip())) {
            return Err(ValidationError::UnsafeLink.into());
        }
        Ok(CheckedLink { url, pinned })
    }

    /// HTTP client that connects only to the checked addresses of `link`.
    fn client_for(&self, link: &CheckedLink) -> Result<reqwest::Client> {
        let Some(host) = link.url.host_str().filter(|_| !link.pinned.is_empty()) else {
            return Ok(self.http.clone());
        };
        client_builder()
            .resolve_to_addrs(host, &link.pinned)
            .build()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Checks a link and visits it with a GET. Returns whether the visit
    /// succeeded.
    async fn visit_link(&self, link: &str) -> Result<bool> {
        let checked = self.resolve_link(link).await?;
        let http = self.client_for(&checked)?;
        Ok(visit(&http, checked.url).await.success)
    }

    /// Unsubscribes through one link.
    ///
    /// `mailto:` links are reported back for the user's mail client. Web
    /// links get an RFC 8058 one-click POST first and a GET as fallback.
    ///
    /// # Errors
    ///
    /// Returns a validation error for missing or unsafe links. Network
    /// failures are reported in the result, not as errors.
    pub async fn unsubscribe(&self, link: &str) -> Result<UnsubscribeResult> {
        let link = link.trim();
        if link.is_empty() {
            return Err(ValidationError::InvalidLink.into());
        }
        if link.to_ascii_lowercase().starts_with("mailto:") {
            return Ok(UnsubscribeResult {
                success: false,
                method: "mailto",
                message: "Email-based unsubscribe, open in your mail client".to_string(),
            });
        }
        let checked = self.resolve_link(link).await?;
        self.follow(checked).await
    }

    /// One-click POST to a checked link, then a GET as fallback.
    async fn follow(&self, link: CheckedLink) -> Result<UnsubscribeResult> {
        let http = self.client_for(&link)?;
        let url = link.url;
        match http
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(ONE_CLICK_BODY)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!(host = url.host_str(), "Unsubscribed via one-click POST");
                return Ok(UnsubscribeResult {
                    success: true,
                    method: "post",
                    message: "Unsubscribed successfully".to_string(),
                });
            }
            Ok(response) => debug!(status = %response.status(), "One-click POST refused, trying GET"),
            Err(e) => debug!(error = %e, "One-click POST failed, trying GET"),
        }

        Ok(visit(&http, url).await)
    }
}

/// Plain GET of a link; 2xx and 3xx count as success.
async fn visit(http: &reqwest::Client, url: Url) -> UnsubscribeResult {
    match http.get(url).send().await {
        Ok(response) if response.status().is_success() || response.status().is_redirection() => {
            UnsubscribeResult {
                success: true,
                method: "get",
                message: "Unsubscribed (confirmation may be needed)".to_string(),
            }
        }
        Ok(response) => UnsubscribeResult {
            success: false,
            method: "get",
            message: format!("Server returned status {}", response.status().as_u16()),
        },
        Err(e) => UnsubscribeResult {
            success: false,
            method: "get",
            message: format!("Failed to unsubscribe: {e}"),
        },
    }
}

/// Counts from processing an unsubscribe label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelUnsubscribeReport {
    /// Messages carrying the label.
    pub processed: usize,
    /// Links visited successfully.
    pub succeeded: usize,
    /// Messages without a usable link, or whose visit failed.
    pub failed: usize,
}

/// Unsubscribes from every message carrying `label_name`, then removes the
/// label from those messages.
///
/// # Errors
///
/// Returns [`ValidationError::UnknownLabel`] if no such label exists, or a
/// transport error that aborted the run.
pub async fn process_unsubscribe_label<G: Gateway>(
    gateway: &G,
    unsubscriber: &Unsubscriber,
    label_name: &str,
    batch_size: usize,
) -> Result<LabelUnsubscribeReport> {
    let label = labels::find_label(gateway, label_name)
        .await?
        .ok_or(ValidationError::UnknownLabel)?;
    let query = format!("label:{}", crate::filter::label_query_name(&label.name));
    let ids = collect_message_ids(gateway, &query, None).await?;
    info!(label = %label.name, messages = ids.len(), "Processing unsubscribe label");

    let mut report = LabelUnsubscribeReport::default();
    let batch_size = batch_size.clamp(1, gateway.max_batch_size());
    for chunk in ids.chunks(batch_size) {
        let mut links = Vec::with_capacity(chunk.len());
        gateway
            .fetch_messages(chunk, MessageFormat::Metadata, |id, outcome| match outcome {
                Ok(message) => links.push(
                    message
                        .header("List-Unsubscribe")
                        .and_then(parse_list_unsubscribe)
                        .and_then(|l| l.url),
                ),
                Err(failure) => {
                    warn!(id, reason = %failure, "Could not read message for unsubscribe");
                    links.push(None);
                }
            })
            .await?;

        for link in links {
            report.processed += 1;
            let Some(link) = link else {
                report.failed += 1;
                continue;
            };
            match unsubscriber.visit_link(&link).await {
                Ok(true) => report.succeeded += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    warn!(error = %e, "Skipping unsubscribe link");
                    report.failed += 1;
                }
            }
        }

        gateway
            .modify_messages(chunk, &LabelChange::remove(label.id.clone()), |id, outcome| {
                if let Err(failure) = outcome {
                    warn!(id, reason = %failure, "Could not remove unsubscribe label");
                }
            })
            .await?;
    }
    Ok(report)
}
