use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "leadflow.yaml";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_MAX_BODY: usize = 1_048_576;
pub const DEFAULT_WORKFLOW_TIMEOUT_S: u64 = 120;
pub const DEFAULT_ASSISTANT_MODEL: &str = "gpt-4o";
pub const DEFAULT_SEARCH_RESULTS: u32 = 5;

/// Configuration loaded from `leadflow.yaml`.
/// All fields are optional; missing fields fall back to CLI/env/defaults.
/// API keys are never read from this file, only from the environment.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct LeadflowConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Root of the JSON record store, used when no `database_url` is set.
    pub data_dir: Option<String>,
    /// sqlx connection URL (`sqlite://...`, or `postgres://...` with the feature).
    pub database_url: Option<String>,
    pub max_body: Option<usize>,
    /// Wall-clock budget for one workflow trigger, in seconds.
    pub workflow_timeout_s: Option<u64>,
    pub llm: LlmSection,
    pub search: SearchSection,
    pub scrape: ScrapeSection,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: Option<String>,
    /// Model used by the extraction agents.
    pub model: Option<String>,
    /// Model used by the CRM assistant.
    pub assistant_model: Option<String>,
    pub temperature_override: Option<f64>,
    pub timeout_s: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SearchSection {
    pub base_url: Option<String>,
    pub max_results: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ScrapeSection {
    pub base_url: Option<String>,
}

impl LeadflowConfig {
    /// Load configuration from a YAML file.
    ///
    /// - If `path` is `Some`, load that specific file (error if missing).
    /// - If `path` is `None`, auto-detect `leadflow.yaml` in cwd; return defaults if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path.to_path_buf()
            }
        };

        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", file_path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty file parses as null.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(contents)?)
    }

    pub fn workflow_timeout(&self) -> Duration {
        Duration::from_secs(self.workflow_timeout_s.unwrap_or(DEFAULT_WORKFLOW_TIMEOUT_S))
    }

    pub fn search_results(&self) -> u32 {
        self.search.max_results.unwrap_or(DEFAULT_SEARCH_RESULTS)
    }
}

/// First non-empty environment variable among `names`.
pub fn env_secret(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}
