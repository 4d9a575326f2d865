pub mod firecrawl;
pub mod tavily;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use firecrawl::FirecrawlScraper;
pub use tavily::TavilyResearch;

/// Result of fetching one page. `success == false` means the source was
/// unavailable (blocked, paywalled, not configured) and callers skip it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
}

impl ScrapeResult {
    pub fn page(markdown: impl Into<String>) -> Self {
        Self {
            success: true,
            markdown: Some(markdown.into()),
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Page content when the fetch succeeded with a non-blank body.
    pub fn content(&self) -> Option<&str> {
        if !self.success {
            return None;
        }
        self.markdown.as_deref().filter(|m| !m.trim().is_empty())
    }
}

/// Unstructured-text research: web search and page fetching.
#[async_trait]
pub trait Research: Send + Sync {
    /// Run a web search and return the results as plain text.
    async fn search(&self, query: &str) -> Result<String>;

    /// Fetch a page as markdown. Returns `ScrapeResult::unavailable()` rather
    /// than an error when the source refuses or cannot be reached.
    async fn scrape_page(&self, url: &str) -> Result<ScrapeResult>;
}

/// Research that never leaves the process. Search answers with placeholder
/// text so downstream extraction still runs; scraping is always unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineResearch;

#[async_trait]
impl Research for OfflineResearch {
    async fn search(&self, query: &str) -> Result<String> {
        Ok(format!("Mock search results for {}", query.trim()))
    }

    async fn scrape_page(&self, _url: &str) -> Result<ScrapeResult> {
        Ok(ScrapeResult::unavailable())
    }
}

/// Live research: Tavily for search and Firecrawl for pages, each optional.
/// A missing provider degrades to `OfflineResearch` behaviour.
pub struct WebResearch {
    search: Option<TavilyResearch>,
    scraper: Option<FirecrawlScraper>,
}

impl WebResearch {
    pub fn new(search: Option<TavilyResearch>, scraper: Option<FirecrawlScraper>) -> Self {
        if search.is_none() {
            warn!("TAVILY_API_KEY not set; web search returns placeholder results");
        }
        if scraper.is_none() {
            warn!("FIRECRAWL_API_KEY not set; profile scraping is unavailable");
        }
        Self { search, scraper }
    }
}

#[async_trait]
impl Research for WebResearch {
    async fn search(&self, query: &str) -> Result<String> {
        match self.search {
            Some(ref tavily) => tavily.search(query).await,
            None => OfflineResearch.search(query).await,
        }
    }

    async fn scrape_page(&self, url: &str) -> Result<ScrapeResult> {
        match self.scraper {
            Some(ref firecrawl) => firecrawl.scrape(url).await,
            None => Ok(ScrapeResult::unavailable()),
        }
    }
}

/// `https://www.linkedin.com/in/<handle>` style profile URLs.
pub fn is_linkedin_profile_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    parsed
        .host_str()
        .is_some_and(|host| host.contains("linkedin.com"))
        && parsed.path().contains("/in/")
}

/// `https://x.com/<handle>` or `https://twitter.com/<handle>`; exactly one
/// path segment, so status and list URLs are rejected.
pub fn is_twitter_profile_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let host_ok = parsed.host_str().is_some_and(|host| {
        let host = host.strip_prefix("www.").unwrap_or(host);
        host == "twitter.com" || host == "x.com" || host == "mobile.twitter.com"
    });
    let segments = parsed
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .count();
    host_ok && segments == 1
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
