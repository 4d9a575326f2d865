use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::ScrapeResult;

pub const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev";

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<ScrapeData>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: Option<String>,
}

/// Page fetching through the Firecrawl scrape API.
pub struct FirecrawlScraper {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl FirecrawlScraper {
    pub fn new(base_url: &str, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/scrape", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    /// Refusals (LinkedIn answers 403 on most plans) come back as
    /// `ScrapeResult::unavailable()`; only transport failures are errors.
    pub async fn scrape(&self, url: &str) -> Result<ScrapeResult> {
        debug!(url = %url, "firecrawl scrape");
        let body = json!({
            "url": url,
            "formats": ["markdown"],
            "onlyMainContent": true,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("scrape: request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(url = %url, status = %status, body = %text, "Page unavailable for scraping");
            return Ok(ScrapeResult::unavailable());
        }

        let parsed: ScrapeResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(url = %url, error = %e, "Unreadable scrape response");
                return Ok(ScrapeResult::unavailable());
            }
        };

        match parsed.data.and_then(|d| d.markdown) {
            Some(markdown) if parsed.success => Ok(ScrapeResult::page(markdown)),
            _ => Ok(ScrapeResult::unavailable()),
        }
    }
}
