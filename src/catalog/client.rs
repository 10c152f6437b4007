//! HTTP client for Digi-Key catalog requests using wreq for TLS fingerprint emulation.

use crate::catalog::locale::Locale;
use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use rand::Rng;
use regex_lite::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wreq::cookie::Jar;
use wreq::Client;
use wreq_util::Emulation;

/// Upper bound on a single retry backoff.
const MAX_BACKOFF_MS: u64 = 30_000;

/// The storefront index sets its session cookie from script rather than a header.
static SCRIPTED_COOKIE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"setTimeout\(function\(\)\{document\.cookie="([^"]+)""#).unwrap()
});

/// Extracts the cookie a page assigns through `document.cookie` on a timer.
pub fn scripted_cookie(html: &str) -> Option<&str> {
    SCRIPTED_COOKIE.captures(html)?.get(1).map(|m| m.as_str())
}

/// The fetch boundary: one GET of a catalog path with query pairs.
///
/// Implementations own transport concerns (headers, cookies, retries). Callers
/// never retry; a returned error is final for that request.
#[async_trait]
pub trait CatalogFetch: Send + Sync {
    /// Fetches `path` relative to the storefront root and returns the page markup.
    async fn fetch(&self, path: &str, query: &[(String, String)]) -> Result<String>;

    /// Returns the locale this fetcher is pinned to.
    fn locale(&self) -> &Locale;
}

/// Fetches through `fetcher`, giving up with [`Error::Cancelled`] once `cancel` fires.
pub async fn fetch_or_cancel(
    fetcher: &dyn CatalogFetch,
    cancel: &CancellationToken,
    path: &str,
    query: &[(String, String)],
) -> Result<String> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fetcher.fetch(path, query) => result,
    }
}

/// Builds `{base}/{path}?{query}`, repeating keys that carry several values.
pub fn build_url(base: &str, path: &str, query: &[(String, String)]) -> String {
    let mut url = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    if !query.is_empty() {
        let encoded: Vec<String> = query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        url.push('?');
        url.push_str(&encoded.join("&"));
    }
    url
}

/// Catalog HTTP client with browser impersonation, polite delays, and bounded retries.
pub struct CatalogClient {
    client: Client,
    cookies: Arc<Jar>,
    locale: Locale,
    delay_ms: u64,
    delay_jitter_ms: u64,
    max_retries: u32,
    retry_backoff_ms: u64,
    base_url: Option<String>,
}

impl CatalogClient {
    /// Creates a new catalog client with the given configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_base_url(config, None)
    }

    /// Creates a new catalog client with an optional custom base URL (for testing).
    pub fn with_base_url(config: &Config, base_url: Option<String>) -> Result<Self> {
        let locale = config.locale();
        let origin = base_url.clone().unwrap_or_else(|| locale.base_url());
        let cookies = Arc::new(Jar::default());
        for (name, value) in locale.cookies() {
            cookies.add(format!("{}={}; Path=/", name, value), origin.as_str());
        }

        let mut builder = Client::builder()
            .cookie_provider(cookies.clone())
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10));

        if let Some(proxy_url) = &config.proxy {
            debug!("Configuring proxy: {}", proxy_url);
            let proxy = wreq::Proxy::all(proxy_url)
                .map_err(|e| Error::transport(proxy_url, format!("invalid proxy: {}", e), false))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::transport("", format!("failed to build HTTP client: {}", e), false))?;

        Ok(Self {
            client,
            cookies,
            locale,
            delay_ms: config.delay_ms,
            delay_jitter_ms: config.delay_jitter_ms,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            base_url,
        })
    }

    /// Returns the base URL (custom for testing, or locale-based for production).
    fn base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| self.locale.base_url())
    }

    /// Stores a cookie in `Set-Cookie` syntax for the storefront origin.
    pub fn add_cookie(&self, cookie: &str) {
        debug!("Storing cookie {}", cookie.split(';').next().unwrap_or(cookie));
        self.cookies.add(cookie.to_string(), self.base_url().as_str());
    }

    /// Value of the named cookie as it would be sent to the storefront root.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies
            .matches(self.base_url().as_str())
            .find(|c| c.name() == name)
            .map(|c| c.value().to_string())
    }

    /// GETs `url`, retrying transient failures with exponential backoff.
    async fn get(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.get_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        "Attempt {}/{} failed: {}. Retrying in {}ms",
                        attempt + 1,
                        self.max_retries + 1,
                        e,
                        backoff
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Performs a single GET with all anti-bot measures.
    async fn get_once(&self, url: &str) -> Result<String> {
        self.delay().await;

        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .emulation(Emulation::Chrome131)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8")
            .header("Accept-Language", self.locale.accept_language())
            .header("Accept-Encoding", "gzip, deflate, br")
            .header("Referer", self.base_url())
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "same-origin")
            .header("Upgrade-Insecure-Requests", "1")
            .send()
            .await
            .map_err(|e| Error::transport(url, format!("request failed: {}", e), true))?;

        let status = response.status();
        debug!("Response status: {}", status);

        if status == 429 {
            warn!("Rate limited (429). Consider using a proxy or increasing delay.");
        }

        if !status.is_success() {
            let retryable = status.is_server_error() || status == 429;
            return Err(Error::transport(url, format!("status {}", status), retryable));
        }

        let final_url = response.uri().to_string();
        if !final_url.contains(&self.locale.domain()) && self.base_url.is_none() {
            warn!(
                "Redirected to different domain: {}. The storefront may have overridden the locale.",
                final_url
            );
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(url, format!("failed to read body: {}", e), true))?;

        if let Some(cookie) = scripted_cookie(&body) {
            self.add_cookie(cookie);
        }
        Ok(body)
    }

    /// Exponential backoff for `attempt` (0-based) with up to 50% random jitter.
    fn backoff(&self, attempt: u32) -> u64 {
        let base = self.retry_backoff_ms.saturating_mul(1u64 << attempt.min(16)).min(MAX_BACKOFF_MS);
        let jitter = if base > 1 { rand::rng().random_range(0..=base / 2) } else { 0 };
        base + jitter
    }

    /// Adds a random delay to mimic human behavior.
    async fn delay(&self) {
        if self.delay_ms == 0 {
            return;
        }

        let jitter = if self.delay_jitter_ms > 0 {
            rand::rng().random_range(0..=self.delay_jitter_ms)
        } else {
            0
        };

        let total_delay = self.delay_ms + jitter;
        debug!("Delaying {}ms", total_delay);
        tokio::time::sleep(Duration::from_millis(total_delay)).await;
    }
}

#[async_trait]
impl CatalogFetch for CatalogClient {
    async fn fetch(&self, path: &str, query: &[(String, String)]) -> Result<String> {
        let url = build_url(&self.base_url(), path, query);
        self.get(&url).await
    }

    fn locale(&self) -> &Locale {
        &self.locale
    }
}
