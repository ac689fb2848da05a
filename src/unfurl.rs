//! Link preview resolution.
//!
//! Given a URL, fetch it and extract `{title, description, image,
//! favicon}` from Open Graph tags, falling back to Twitter-card tags for
//! the image and to plain `<title>`/meta-description. The contract is
//! any-error-to-empty: callers always receive the full four-field tuple
//! and never branch on failure - the client renders an empty bookmark.
//!
//! Targets are restricted to public http(s) hosts; literal loopback,
//! private, and link-local addresses are refused so the resolver cannot
//! be used to probe the internal network.

use std::net::IpAddr;

use futures_util::StreamExt;
use scraper::{Html, Selector};
use serde::Serialize;
use url::{Host, Url};

/// Fetch timeout for the target page.
const FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;
/// Responses beyond this many bytes are abandoned unparsed.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Link preview metadata. Missing fields are empty strings, never absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnfurlResult {
    /// Page title.
    pub title: String,
    /// Page description.
    pub description: String,
    /// Representative image URL.
    pub image: String,
    /// Favicon URL.
    pub favicon: String,
}

/// Stateless resolver holding the shared HTTP client.
pub struct UnfurlResolver {
    client: reqwest::Client,
}

impl UnfurlResolver {
    /// Build a resolver with bounded timeout and redirect policy.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!("sketchrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("static client configuration is valid");
        Self { client }
    }

    /// Resolve preview metadata for a URL. Never fails; any fetch or
    /// parse problem yields the all-empty result.
    pub async fn resolve(&self, raw_url: &str) -> UnfurlResult {
        match self.try_resolve(raw_url).await {
            Some(result) => result,
            None => {
                tracing::debug!(url = raw_url, "unfurl yielded no metadata");
                UnfurlResult::default()
            },
        }
    }

    async fn try_resolve(&self, raw_url: &str) -> Option<UnfurlResult> {
        let url = Url::parse(raw_url).ok()?;
        if !is_public_http_target(&url) {
            tracing::debug!(url = raw_url, "unfurl target refused");
            return None;
        }

        let response = self.client.get(url).send().await.ok()?;
        if let Some(len) = response.content_length() {
            if len > MAX_BODY_BYTES as u64 {
                return None;
            }
        }
        // Redirects may have moved us; relative URLs resolve against the
        // final location.
        let final_url = response.url().clone();

        // The declared length is untrusted (and absent under chunked
        // encoding), so the cap is enforced while streaming.
        let mut stream = response.bytes_stream();
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.ok()?;
            if body.len() + chunk.len() > MAX_BODY_BYTES {
                tracing::debug!(url = %final_url, "unfurl body over size cap, abandoning");
                return None;
            }
            body.extend_from_slice(&chunk);
        }
        let html = String::from_utf8_lossy(&body).into_owned();

        // scraper's DOM is not Send, so parsing cannot cross an await.
        tokio::task::spawn_blocking(move || extract_metadata(&html, &final_url)).await.ok()
    }
}

impl Default for UnfurlResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Only public http(s) targets are fetched.
fn is_public_http_target(url: &Url) -> bool {
    if url.scheme() != "http" && url.scheme() != "https" {
        return false;
    }
    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.');
            !domain.eq_ignore_ascii_case("localhost")
        },
        Some(Host::Ipv4(addr)) => is_public_ip(IpAddr::V4(addr)),
        Some(Host::Ipv6(addr)) => is_public_ip(IpAddr::V6(addr)),
        None => false,
    }
}

fn is_public_ip(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            !(v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified())
        },
        IpAddr::V6(v6) => {
            let seg = v6.segments();
            let unique_local = (seg[0] & 0xfe00) == 0xfc00;
            let link_local = (seg[0] & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        },
    }
}

fn extract_metadata(html: &str, base: &Url) -> UnfurlResult {
    let doc = Html::parse_document(html);

    let title = meta_content(&doc, "meta[property=\"og:title\"]")
        .or_else(|| element_text(&doc, "title"))
        .unwrap_or_default();

    let description = meta_content(&doc, "meta[property=\"og:description\"]")
        .or_else(|| meta_content(&doc, "meta[name=\"description\"]"))
        .unwrap_or_default();

    let image = meta_content(&doc, "meta[property=\"og:image\"]")
        .or_else(|| meta_content(&doc, "meta[name=\"twitter:image\"]"))
        .and_then(|src| absolutize(base, &src))
        .unwrap_or_default();

    let favicon = icon_href(&doc)
        .and_then(|href| absolutize(base, &href))
        .or_else(|| base.join("/favicon.ico").ok().map(String::from))
        .unwrap_or_default();

    UnfurlResult { title, description, image, favicon }
}

fn meta_content(doc: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    let content = doc.select(&selector).next()?.value().attr("content")?.trim();
    (!content.is_empty()).then(|| content.to_string())
}

fn element_text(doc: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    let text: String = doc.select(&selector).next()?.text().collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn icon_href(doc: &Html) -> Option<String> {
    for css in ["link[rel=\"icon\"]", "link[rel=\"shortcut icon\"]", "link[rel=\"apple-touch-icon\"]"] {
        let selector = Selector::parse(css).ok()?;
        if let Some(href) = doc.select(&selector).next().and_then(|el| el.value().attr("href")) {
            if !href.trim().is_empty() {
                return Some(href.trim().to_string());
            }
        }
    }
    None
}

fn absolutize(base: &Url, href: &str) -> Option<String> {
    base.join(href).ok().map(String::from)
}
