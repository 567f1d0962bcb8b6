use async_trait::async_trait;
use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

use super::parser::{parse_feed, ParseResult, ResolvedItem};
use crate::util::validate_feed_url;

/// Default bound on a whole fetch+parse.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default response body cap.
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
pub const DEFAULT_USER_AGENT: &str = concat!("feedcache/", env!("CARGO_PKG_VERSION"));

const MAX_REDIRECTS: usize = 5;

/// Errors that can occur while resolving a source.
///
/// Resolution never retries; the scheduler decides when to try again.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Not an absolute http(s) URL, or refused by the private-network guard
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Document could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Fetch+parse exceeded the configured bound
    #[error("Resolution timed out after {0:?}")]
    Timeout(Duration),
}

/// A fetched and normalized feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub title: String,
    pub items: Vec<ResolvedItem>,
}

/// Turns a feed URL into a [`ResolvedSource`].
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<ResolvedSource, ResolveError>;
}

/// Tunables for [`HttpResolver`].
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub timeout: Duration,
    pub max_feed_size: usize,
    /// Use the document's own title when it has one, hostname otherwise.
    pub prefer_document_title: bool,
    /// Refuse loopback and private-network hosts.
    pub block_private_networks: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_feed_size: DEFAULT_MAX_FEED_SIZE,
            prefer_document_title: false,
            block_private_networks: false,
        }
    }
}

/// Fetches feeds over HTTP and parses them with `feed-rs`.
#[derive(Clone)]
pub struct HttpResolver {
    client: reqwest::Client,
    options: ResolverOptions,
}

impl HttpResolver {
    pub fn new(client: reqwest::Client, options: ResolverOptions) -> Self {
        Self { client, options }
    }

    /// HTTP client suited to feed fetching: bounded redirects, no loops.
    pub fn build_client(user_agent: &str) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(redirect_policy())
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
    }

    async fn fetch_and_parse(&self, url: &url::Url) -> Result<ResolvedSource, ResolveError> {
        let response = self.client.get(url.as_str()).send().await?;

        if !response.status().is_success() {
            return Err(ResolveError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, self.options.max_feed_size).await?;

        let ParseResult {
            title: document_title,
            items,
            skipped,
        } = parse_feed(&bytes).map_err(|e| ResolveError::Parse(e.to_string()))?;

        if skipped > 0 {
            tracing::debug!(
                url = %url,
                filtered = skipped,
                "Entries with empty or relative links skipped"
            );
        }

        let hostname = url.host_str().unwrap_or_default().to_string();
        let title = match document_title {
            Some(doc_title) if self.options.prefer_document_title => doc_title,
            _ => hostname,
        };

        Ok(ResolvedSource { title, items })
    }
}

#[async_trait]
impl Resolver for HttpResolver {
    async fn resolve(&self, url: &str) -> Result<ResolvedSource, ResolveError> {
        let parsed = validate_feed_url(url, self.options.block_private_networks)
            .map_err(|e| ResolveError::InvalidUrl(e.to_string()))?;

        tokio::time::timeout(self.options.timeout, self.fetch_and_parse(&parsed))
            .await
            .map_err(|_| ResolveError::Timeout(self.options.timeout))?
    }
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ResolveError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ResolveError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ResolveError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
