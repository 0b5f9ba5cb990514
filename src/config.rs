use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE: &str = ".preview-deploy.toml";
pub const DEFAULT_MANAGEMENT_URL: &str = "https://management.azure.com";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_COMMENT_USER: &str = "github-actions[bot]";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .preview-deploy.toml.
/// All fields are optional; tokens fall back to environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub azure: AzureConfig,

    #[serde(default)]
    pub github: GitHubConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AzureConfig {
    /// Resource Manager endpoint, e.g. for sovereign clouds.
    pub management_url: Option<String>,
    /// Bearer token for management.azure.com. Falls back to AZURE_ACCESS_TOKEN.
    pub management_token: Option<String>,
    /// Bearer token for blob storage. Falls back to AZURE_STORAGE_TOKEN.
    pub storage_token: Option<String>,
    /// Seconds between polls of a long-running ARM operation.
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    pub api_url: Option<String>,
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    /// Login that owns the status comment.
    pub comment_user: Option<String>,
}

impl Config {
    /// Load configuration from .preview-deploy.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn management_url(&self) -> &str {
        self.azure
            .management_url
            .as_deref()
            .unwrap_or(DEFAULT_MANAGEMENT_URL)
    }

    pub fn management_token(&self) -> Option<String> {
        self.azure
            .management_token
            .clone()
            .or_else(|| std::env::var("AZURE_ACCESS_TOKEN").ok())
    }

    pub fn storage_token(&self) -> Option<String> {
        self.azure
            .storage_token
            .clone()
            .or_else(|| std::env::var("AZURE_STORAGE_TOKEN").ok())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.azure
                .poll_interval_secs
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        )
    }

    pub fn github_api_url(&self) -> &str {
        self.github
            .api_url
            .as_deref()
            .unwrap_or(DEFAULT_GITHUB_API_URL)
    }

    /// Config file value takes precedence, falls back to GITHUB_TOKEN env var.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }

    pub fn comment_user(&self) -> &str {
        self.github
            .comment_user
            .as_deref()
            .unwrap_or(DEFAULT_COMMENT_USER)
    }
}
