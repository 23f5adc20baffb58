//! HTTP fetcher implementation
//!
//! This module handles all page requests for the crawler, including:
//! - Building the HTTP client with the configured user agent and timeouts
//! - Following redirects and reporting the final resolved URL
//! - Content-Type gating (only HTML-like bodies are read)
//! - Error classification

use crate::config::CrawlerSettings;
use crate::crawler::FrontierEntry;
use reqwest::{header::CONTENT_TYPE, redirect::Policy, Client};
use std::time::Duration;
use url::Url;

/// A successfully fetched HTML page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL as scheduled by the frontier
    pub url: Url,
    /// Final URL after redirects
    pub final_url: Url,
    pub status_code: u16,
    pub content_type: String,
    pub depth: u32,
    pub body: String,
}

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched an HTML page
    Success(FetchedPage),

    /// Page is not HTML (Content-Type mismatch)
    ContentMismatch {
        /// The actual Content-Type received
        content_type: String,
    },

    /// Non-2xx response
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Network error (connection refused, timeout, too many redirects, etc.)
    NetworkError {
        /// Error description
        error: String,
    },
}

impl FetchResult {
    /// Error text for failed fetches, `None` on success
    pub fn error_text(&self) -> Option<String> {
        match self {
            Self::Success(_) => None,
            Self::ContentMismatch { content_type } => {
                Some(format!("Unsupported content type: {}", content_type))
            }
            Self::HttpError { status_code } => Some(format!("HTTP {}", status_code)),
            Self::NetworkError { error } => Some(error.clone()),
        }
    }
}

/// Returns true for content types whose body is parsed for links
pub fn is_html_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}

/// Builds an HTTP client with the crawler's configuration
///
/// Redirects are followed (up to 10 hops); the response URL is the final
/// resolved location.
pub fn build_http_client(settings: &CrawlerSettings) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(settings.user_agent.clone())
        .timeout(settings.fetch_timeout())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches frontier entries
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(settings: &CrawlerSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(settings)?,
        })
    }

    /// Fetches one entry
    ///
    /// # Request Flow
    ///
    /// 1. GET the URL, following redirects
    /// 2. Non-2xx status → `HttpError`
    /// 3. Content-Type not HTML-like → `ContentMismatch` (body not read)
    /// 4. Read the body → `Success`
    ///
    /// Transport failures and timeouts map to `NetworkError`. Nothing here
    /// retries; a failed fetch is reported and the crawl moves on.
    pub async fn fetch(&self, entry: &FrontierEntry) -> FetchResult {
        let response = match self.client.get(entry.url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return classify_error(&e),
        };

        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return FetchResult::HttpError {
                status_code: status.as_u16(),
            };
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !is_html_content_type(&content_type) {
            return FetchResult::ContentMismatch { content_type };
        }

        match response.text().await {
            Ok(body) => FetchResult::Success(FetchedPage {
                url: entry.url.clone(),
                final_url,
                status_code: status.as_u16(),
                content_type,
                depth: entry.depth,
                body,
            }),
            Err(e) => classify_error(&e),
        }
    }
}

fn classify_error(e: &reqwest::Error) -> FetchResult {
    let error = if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_redirect() {
        format!("Redirect error: {}", e)
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        e.to_string()
    };

    FetchResult::NetworkError { error }
}
