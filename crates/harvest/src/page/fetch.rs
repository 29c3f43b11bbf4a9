// ABOUTME: HTTP-backed page source: each snapshot is a fresh GET of the page URL.
// ABOUTME: Handles SSRF protection, content-length limits, and charset decoding before parsing.

use std::collections::HashMap;
use std::net::{IpAddr, ToSocketAddrs};

use async_trait::async_trait;
use bytes::Bytes;
use ipnet::{Ipv4Net, Ipv6Net};
use tracing::debug;
use url::Url;

use crate::error::ExtractError;
use crate::options::Options;
use crate::page::{PageSource, Snapshot};

/// Maximum allowed content length (10 MB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// Options for fetching a page.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub headers: HashMap<String, String>,
    pub allow_private_networks: bool,
}

/// A successfully fetched page body.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: u16,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl Fetched {
    /// Decode the body as text, using the charset from the content-type header when present.
    pub fn text(&self) -> String {
        decode_body(&self.body, self.content_type.as_deref())
    }
}

/// Check if an IP address is in a private/reserved range.
pub(crate) fn is_private_ip(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(ip) => {
            const V4_BLOCKED: &[&str] = &[
                "10.0.0.0/8",
                "172.16.0.0/12",
                "192.168.0.0/16",
                "127.0.0.0/8",
                "169.254.0.0/16",
            ];
            V4_BLOCKED
                .iter()
                .filter_map(|net| net.parse::<Ipv4Net>().ok())
                .any(|net| net.contains(ip))
        }
        IpAddr::V6(ip) => {
            if ip.is_loopback() {
                return true;
            }
            const V6_BLOCKED: &[&str] = &["fc00::/7", "fe80::/10"];
            V6_BLOCKED
                .iter()
                .filter_map(|net| net.parse::<Ipv6Net>().ok())
                .any(|net| net.contains(ip))
        }
    }
}

/// Decode body bytes to a String using charset from content-type header or detection.
fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(encoding) = content_type
        .and_then(extract_charset)
        .and_then(|charset| encoding_rs::Encoding::for_label(charset.as_bytes()))
    {
        let (decoded, _, _) = encoding.decode(body);
        return decoded.into_owned();
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

/// Extract charset value from Content-Type header.
fn extract_charset(content_type: &str) -> Option<String> {
    let lower = content_type.to_lowercase();
    lower.split(';').find_map(|part| {
        part.trim()
            .strip_prefix("charset=")
            .map(|c| c.trim_matches('"').trim_matches('\'').to_string())
    })
}

/// Reject URLs whose host is, or resolves to, a private address.
async fn guard_host(target: &Url, requested: &str, what: &str) -> Result<(), ExtractError> {
    let host = match target.host_str() {
        Some(h) => h.trim_start_matches('[').trim_end_matches(']'),
        None => return Ok(()),
    };
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(ExtractError::ssrf(
                requested,
                "Fetch",
                Some(anyhow::anyhow!("{} private IP addresses are not allowed", what)),
            ));
        }
        return Ok(());
    }

    let port = target.port_or_known_default().unwrap_or(80);
    let addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| {
        ExtractError::fetch(
            requested,
            "Fetch",
            Some(anyhow::anyhow!("DNS lookup failed: {}", e)),
        )
    })?;
    for socket_addr in addrs {
        if is_private_ip(&socket_addr.ip()) {
            return Err(ExtractError::ssrf(
                requested,
                "Fetch",
                Some(anyhow::anyhow!("{} private IP addresses are not allowed", what)),
            ));
        }
    }
    Ok(())
}

/// Fetch a page body from the given URL.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOptions,
) -> Result<Fetched, ExtractError> {
    if url.is_empty() {
        return Err(ExtractError::invalid_url(url, "Fetch", None));
    }
    let parsed = Url::parse(url).map_err(|e| {
        ExtractError::invalid_url(url, "Fetch", Some(anyhow::anyhow!("invalid URL: {}", e)))
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ExtractError::invalid_url(
            url,
            "Fetch",
            Some(anyhow::anyhow!("scheme must be http or https")),
        ));
    }
    if !opts.allow_private_networks {
        guard_host(&parsed, url, "request to").await?;
    }

    let mut request = client.get(url);
    for (key, value) in &opts.headers {
        request = request.header(key, value);
    }
    let response = request.send().await.map_err(|e| {
        ExtractError::fetch(url, "Fetch", Some(anyhow::anyhow!("request failed: {}", e)))
    })?;

    if !opts.allow_private_networks {
        guard_host(response.url(), url, "redirect to").await?;
    }

    if let Some(len) = response.content_length() {
        if len as usize > MAX_CONTENT_LENGTH {
            return Err(ExtractError::fetch(
                url,
                "Fetch",
                Some(anyhow::anyhow!("content too large")),
            ));
        }
    }

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase());

    let body = response.bytes().await.map_err(|e| {
        ExtractError::fetch(
            url,
            "Fetch",
            Some(anyhow::anyhow!("failed to read body: {}", e)),
        )
    })?;
    if body.len() > MAX_CONTENT_LENGTH {
        return Err(ExtractError::fetch(
            url,
            "Fetch",
            Some(anyhow::anyhow!("content too large")),
        ));
    }
    if status != 200 {
        return Err(ExtractError::fetch(
            url,
            "Fetch",
            Some(anyhow::anyhow!("HTTP status {}", status)),
        ));
    }

    Ok(Fetched {
        status,
        final_url,
        content_type,
        body,
    })
}

/// Build an HTTP client honoring the engine's timeout, user agent, and private-network policy.
pub fn build_http_client(opts: &Options) -> Result<reqwest::Client, ExtractError> {
    if let Some(ref client) = opts.http_client {
        return Ok(client.clone());
    }
    let allow_private = opts.allow_private_networks;
    let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
        if allow_private {
            return attempt.follow();
        }
        let next = attempt.url().clone();
        let host = match next.host_str() {
            Some(h) => h.trim_start_matches('[').trim_end_matches(']').to_string(),
            None => return attempt.follow(),
        };
        if let Ok(ip) = host.parse::<IpAddr>() {
            if is_private_ip(&ip) {
                return attempt.error("redirect to private IP blocked");
            }
            return attempt.follow();
        }
        // synchronous DNS resolution; the redirect policy cannot await
        let port = next.port_or_known_default().unwrap_or(80);
        match format!("{}:{}", host, port).to_socket_addrs() {
            Ok(mut addrs) => {
                if addrs.any(|sa| is_private_ip(&sa.ip())) {
                    attempt.error("redirect to private IP blocked")
                } else {
                    attempt.follow()
                }
            }
            Err(_) => attempt.error("DNS lookup failed during redirect"),
        }
    });

    reqwest::Client::builder()
        .redirect(redirect_policy)
        .user_agent(&opts.user_agent)
        .timeout(opts.http_timeout)
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
        .map_err(|e| {
            ExtractError::config("", "HttpClient", Some(anyhow::anyhow!("{}", e)))
        })
}

/// A page read over HTTP. Every snapshot refetches, so server-rendered pages
/// that fill in progressively are observed the same way a live tab would be.
#[derive(Debug, Clone)]
pub struct HttpPage {
    url: String,
    client: reqwest::Client,
    opts: FetchOptions,
}

impl HttpPage {
    pub fn new(url: impl Into<String>, client: reqwest::Client, opts: FetchOptions) -> Self {
        Self {
            url: url.into(),
            client,
            opts,
        }
    }
}

#[async_trait(?Send)]
impl PageSource for HttpPage {
    fn url(&self) -> String {
        self.url.clone()
    }

    async fn snapshot(&self) -> Result<Snapshot, ExtractError> {
        let fetched = fetch(&self.client, &self.url, &self.opts).await?;
        debug!(
            url = %self.url,
            final_url = %fetched.final_url,
            bytes = fetched.body.len(),
            "fetched page"
        );
        Ok(Snapshot::parse(&fetched.final_url, &fetched.text()))
    }
}
