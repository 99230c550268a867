use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP server listens on.
    /// Can be overridden with the `GATEWAY_BIND` env var.
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub template: TemplateConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

// -- LLM -----------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Model identifier passed in the invoke URL.
    /// Can be overridden with the `BEDROCK_MODEL_ID` env var.
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Region used to derive the runtime endpoint when `endpoint` is empty.
    /// Can be overridden with the `AWS_REGION` env var.
    #[serde(default = "default_region")]
    pub region: String,

    /// Explicit runtime endpoint (e.g. a VPC endpoint or a local mock).
    /// Can be overridden with the `BEDROCK_ENDPOINT` env var.
    #[serde(default)]
    pub endpoint: String,

    /// Bearer API key.  Prefer the `AWS_BEARER_TOKEN_BEDROCK` env var.
    #[serde(default)]
    pub api_key: String,

    /// Value of the `anthropic_version` field in every request body.
    #[serde(default = "default_anthropic_version")]
    pub anthropic_version: String,

    /// Maximum output tokens requested from the model.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upstream HTTP timeout in seconds (0 = client default of 300s).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            region: default_region(),
            endpoint: String::new(),
            api_key: String::new(),
            anthropic_version: default_anthropic_version(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// -- Template ------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    /// Directory holding one sub-directory per bucket.
    #[serde(default = "default_template_root")]
    pub root: String,

    #[serde(default = "default_template_bucket")]
    pub bucket: String,

    /// Key prefix of the base template; stripped from every file path.
    #[serde(default = "default_template_prefix")]
    pub prefix: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            root: default_template_root(),
            bucket: default_template_bucket(),
            prefix: default_template_prefix(),
        }
    }
}

// -- Server --------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Extra request header browsers are allowed to send (CORS allow-headers).
    #[serde(default = "default_client_key_header")]
    pub client_key_header: String,

    /// Number of fragments buffered between the relay and the HTTP body.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            client_key_header: default_client_key_header(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3040".to_string()
}
fn default_model_id() -> String {
    "us.anthropic.claude-3-7-sonnet-20250219-v1:0".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_anthropic_version() -> String {
    "bedrock-2023-05-31".to_string()
}
fn default_max_tokens() -> u32 {
    32000
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_template_root() -> String {
    "templates".to_string()
}
fn default_template_bucket() -> String {
    "webgen-templates".to_string()
}
fn default_template_prefix() -> String {
    "app-template-base/".to_string()
}
fn default_client_key_header() -> String {
    "aiwebgen-poc-key".to_string()
}
fn default_stream_buffer() -> usize {
    32
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            llm: LlmConfig::default(),
            template: TemplateConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

// -- Config impl ---------------------------------------------------------

impl Config {
    /// Load config from the given path, or the default XDG config location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path(),
        };

        let config = if config_path.exists() {
            info!("loading config from {}", config_path.display());
            let contents = std::fs::read_to_string(&config_path).map_err(GatewayError::Io)?;
            toml::from_str(&contents)
                .map_err(|e| GatewayError::Config(format!("parse error: {e}")))?
        } else {
            info!("no config file found, using defaults");
            Config::default()
        };

        Ok(config)
    }

    /// Returns the default config file path: `$XDG_CONFIG_HOME/webgen-gateway/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("webgen-gateway")
            .join("config.toml")
    }

    /// Listen address, honouring `GATEWAY_BIND`.
    pub fn bind_addr(&self) -> String {
        env_or("GATEWAY_BIND", &self.bind).unwrap_or_else(default_bind)
    }

    /// Generate the default config file contents.
    pub fn default_config_contents() -> &'static str {
        include_str!("../config.example.toml")
    }
}

/// Environment variable `key` if set and non-empty, else `configured` if
/// non-empty, else `None`.
pub fn env_or(key: &str, configured: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| {
            if configured.is_empty() {
                None
            } else {
                Some(configured.to_string())
            }
        })
}
