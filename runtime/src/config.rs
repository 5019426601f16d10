use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config/app.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub uploads: UploadConfig,
    pub suggestions: SuggestionsConfig,
    pub airtable: AirtableConfig,
    pub chunking: ChunkingConfig,
    pub docling: DoclingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_size_bytes: u64,
    pub allowed_extensions: Vec<String>,
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 50 * 1024 * 1024,
            allowed_extensions: vec![
                "pdf".to_string(),
                "txt".to_string(),
                "md".to_string(),
            ],
            allowed_mime_types: vec![
                "application/pdf".to_string(),
                "text/plain".to_string(),
                "text/markdown".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SuggestionsConfig {
    pub cache_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Zep accepts at most ten custom entity types per graph.
    pub max_entity_types: usize,
    pub max_edge_types: usize,
    pub model: String,
    pub openai_base_url: Option<String>,
}

impl SuggestionsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for SuggestionsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            sweep_interval_secs: 60,
            max_entity_types: 10,
            max_edge_types: 10,
            model: "gpt-5-mini".to_string(),
            openai_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AirtableConfig {
    pub base_url: String,
    pub base_id: String,
    /// Logical table name to Airtable table id (or display name).
    pub tables: HashMap<String, String>,
    pub requests_per_window: usize,
    pub window_ms: u64,
}

impl AirtableConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for AirtableConfig {
    fn default() -> Self {
        let tables = [
            ("ontologies", "Ontologies"),
            ("entity_definitions", "EntityDefinitions"),
            ("edge_definitions", "EdgeDefinitions"),
            ("test_datasets", "TestDatasets"),
        ]
        .into_iter()
        .map(|(logical, id)| (logical.to_string(), id.to_string()))
        .collect();

        Self {
            base_url: "https://api.airtable.com/v0".to_string(),
            base_id: String::new(),
            tables,
            requests_per_window: 5,
            window_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            overlap_tokens: 50,
        }
    }
}

/// PDF conversion service. Without a URL only text uploads are analysed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DoclingConfig {
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl DoclingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DoclingConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 120,
        }
    }
}

/// Credentials read from the environment, never from the YAML file.
#[derive(Clone, Default)]
pub struct Secrets {
    pub airtable_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            airtable_api_key: non_empty_var("AIRTABLE_API_KEY"),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("airtable_api_key", &self.airtable_api_key.as_ref().map(|_| "***"))
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub async fn load_config() -> Result<AppConfig> {
    let explicit = env::var("APP_CONFIG_PATH").ok();
    let path = explicit
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    if explicit.is_none() && !path.exists() {
        warn!(path = %path.display(), "Config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path).await
}

pub async fn load_config_from(path: &Path) -> Result<AppConfig> {
    let contents = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config = parse_config(&contents)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    info!(path = %path.display(), "Configuration loaded from disk");
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    if contents.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}
