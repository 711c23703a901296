use anyhow::{Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_max_file_chars")]
    pub max_file_chars: usize,
    #[serde(default = "default_context_max_chars")]
    pub context_max_chars: usize,
    #[serde(default = "default_manifest_limit")]
    pub manifest_limit: usize,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_chars: default_max_file_chars(),
            context_max_chars: default_context_max_chars(),
            manifest_limit: default_manifest_limit(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_max_file_chars() -> usize {
    500_000
}
fn default_context_max_chars() -> usize {
    40_000
}
fn default_manifest_limit() -> usize {
    80
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_raw_base")]
    pub raw_base: String,
    #[serde(default = "default_web_base")]
    pub web_base: String,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            raw_base: default_raw_base(),
            web_base: default_web_base(),
            max_files: default_max_files(),
            batch_size: default_batch_size(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_raw_base() -> String {
    "https://raw.githubusercontent.com".to_string()
}
fn default_web_base() -> String {
    "https://github.com".to_string()
}
fn default_max_files() -> usize {
    150
}
fn default_batch_size() -> usize {
    10
}
fn default_user_agent() -> String {
    format!("code-proof/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}
fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_temperature() -> f64 {
    0.1
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            max_history: default_max_history(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./.cproof")
}
fn default_max_history() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate limits
    if config.limits.max_file_chars == 0 {
        anyhow::bail!("limits.max_file_chars must be > 0");
    }
    if config.limits.context_max_chars == 0 {
        anyhow::bail!("limits.context_max_chars must be > 0");
    }
    for pattern in &config.limits.exclude_globs {
        Glob::new(pattern)
            .with_context(|| format!("limits.exclude_globs: invalid pattern '{}'", pattern))?;
    }

    // Validate remote
    if config.remote.batch_size == 0 {
        anyhow::bail!("remote.batch_size must be >= 1");
    }
    if config.remote.max_files == 0 {
        anyhow::bail!("remote.max_files must be >= 1");
    }

    // Validate engine
    if !(0.0..=2.0).contains(&config.engine.temperature) {
        anyhow::bail!("engine.temperature must be in [0.0, 2.0]");
    }
    if config.engine.max_tokens == 0 {
        anyhow::bail!("engine.max_tokens must be > 0");
    }

    if config.store.max_history == 0 {
        anyhow::bail!("store.max_history must be >= 1");
    }

    Ok(())
}
