use crate::error::{ProxyError, Result};
use crate::models::{default_model_mapping, ModelMapper, DEFAULT_DEPLOYMENT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR_NAME: &str = "claude-azure-proxy";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub debug: bool,
    /// Deployment used for models missing from `models`.
    #[serde(default = "default_deployment")]
    pub default_model: String,
    #[serde(default)]
    pub azure: AzureConfig,
    #[serde(default = "default_model_mapping")]
    pub models: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_port() -> u16 {
    8000
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_deployment() -> String {
    DEFAULT_DEPLOYMENT.to_string()
}

fn default_api_key_env() -> String {
    "AZURE_OPENAI_API_KEY".to_string()
}

fn default_api_version() -> String {
    "2025-04-01-preview".to_string()
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_key_env: default_api_key_env(),
            api_version: default_api_version(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            debug: false,
            default_model: default_deployment(),
            azure: AzureConfig::default(),
            models: default_model_mapping(),
        }
    }
}

impl ProxyConfig {
    /// Load config from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file, then apply environment overrides.
    /// Priority: CLI arg > CWD > XDG config > home dir > built-in defaults
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::load(path)?,
            None => match config_search_paths().into_iter().find(|p| p.exists()) {
                Some(candidate) => {
                    tracing::info!(path = %candidate.display(), "Loading config");
                    Self::load(&candidate)?
                }
                None => {
                    tracing::info!("No config file found, using defaults and environment");
                    Self::default()
                }
            },
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply `AZURE_OPENAI_ENDPOINT`, `AZURE_API_VERSION` and `MODEL_MAPPING`
    /// (a JSON object) from `lookup`, usually the process environment.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(endpoint) = lookup("AZURE_OPENAI_ENDPOINT").filter(|v| !v.is_empty()) {
            self.azure.endpoint = Some(endpoint);
        }
        if let Some(version) = lookup("AZURE_API_VERSION").filter(|v| !v.is_empty()) {
            self.azure.api_version = version;
        }
        if let Some(raw) = lookup("MODEL_MAPPING").filter(|v| !v.is_empty()) {
            self.models = serde_json::from_str(&raw).map_err(|e| {
                ProxyError::config(format!("MODEL_MAPPING is not a JSON object of strings: {e}"))
            })?;
        }
        Ok(())
    }

    /// The Azure resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub fn effective_endpoint(&self) -> Result<&str> {
        self.azure
            .endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                ProxyError::config(
                    "No Azure endpoint configured. Set AZURE_OPENAI_ENDPOINT or [azure].endpoint",
                )
            })
    }

    /// Resolve the API key: literal config value first, then the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.azure.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }
        std::env::var(&self.azure.api_key_env).map_err(|_| {
            ProxyError::config(format!(
                "Environment variable '{}' not set. Set it with your Azure OpenAI API key.",
                self.azure.api_key_env
            ))
        })
    }

    pub fn chat_completions_url(&self) -> Result<String> {
        let endpoint = self.effective_endpoint()?;
        Ok(format!(
            "{}/openai/v1/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            self.azure.api_version
        ))
    }

    pub fn model_mapper(&self) -> ModelMapper {
        ModelMapper::new(self.models.clone(), self.default_model.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from(format!("{CONFIG_DIR_NAME}.toml")));

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join(CONFIG_DIR_NAME).join("config.toml"));
    }

    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join(CONFIG_DIR_NAME).join("config.toml"));
        // Home directory fallback
        paths.push(home.join(format!(".{CONFIG_DIR_NAME}.toml")));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
