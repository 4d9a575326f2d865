use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

/// Web search through the Tavily search API.
pub struct TavilyResearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    max_results: u32,
}

impl TavilyResearch {
    pub fn new(base_url: &str, api_key: String, max_results: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/search", base_url.trim_end_matches('/')),
            api_key,
            max_results,
        })
    }

    pub async fn search(&self, query: &str) -> Result<String> {
        debug!(query = %query, "tavily search");
        let body = json!({
            "query": query,
            "max_results": self.max_results,
            "search_depth": "basic",
            "include_answer": true,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("search: request failed: {}", e))?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            anyhow::bail!("search: {} returned {}: {}", self.endpoint, status, text);
        }

        let parsed: SearchResponse =
            serde_json::from_str(&text).context("search: unexpected response shape")?;
        Ok(format_results(&parsed))
    }
}

fn format_results(response: &SearchResponse) -> String {
    let mut blocks = Vec::with_capacity(response.results.len() + 1);
    if let Some(answer) = response.answer.as_deref().filter(|a| !a.trim().is_empty()) {
        blocks.push(format!("Answer: {}", answer.trim()));
    }
    for hit in &response.results {
        blocks.push(format!("{}\n{}\nURL: {}", hit.title, hit.content, hit.url));
    }
    blocks.join("\n\n")
}
