use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models: ModelsConfig::default(),
            context: ContextConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Max-tokens budget per model size class.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    #[serde(default = "default_small_max_tokens")]
    pub small: u64,
    #[serde(default = "default_medium_max_tokens")]
    pub medium: u64,
    #[serde(default = "default_large_max_tokens")]
    pub large: u64,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            small: default_small_max_tokens(),
            medium: default_medium_max_tokens(),
            large: default_large_max_tokens(),
        }
    }
}

impl ModelsConfig {
    /// Budget for a named size class. Unknown names are a caller error,
    /// raised synchronously and never retried.
    pub fn max_tokens(&self, category: &str) -> std::result::Result<u64, ConfigError> {
        match category {
            "small" => Ok(self.small),
            "medium" => Ok(self.medium),
            "large" => Ok(self.large),
            other => Err(ConfigError::UnknownModelCategory(other.to_string())),
        }
    }
}

fn default_small_max_tokens() -> u64 {
    4000
}
fn default_medium_max_tokens() -> u64 {
    8000
}
fn default_large_max_tokens() -> u64 {
    16000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    /// Share of the model budget allocated to grounding context, in
    /// whole percent.
    #[serde(default = "default_context_percent")]
    pub percent: u8,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            percent: default_context_percent(),
        }
    }
}

fn default_context_percent() -> u8 {
    70
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_debounce_secs() -> u64 {
    10
}
fn default_retry_backoff_secs() -> u64 {
    5
}
fn default_max_retries() -> u32 {
    3
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.models.small == 0 || config.models.medium == 0 || config.models.large == 0 {
        anyhow::bail!("models.* max_tokens must be > 0");
    }

    if config.context.percent == 0 || config.context.percent > 100 {
        anyhow::bail!("context.percent must be in 1..=100");
    }

    if config.scheduler.debounce_secs == 0 {
        anyhow::bail!("scheduler.debounce_secs must be > 0");
    }

    Ok(())
}

/// Hot-reloadable configuration handle.
///
/// Consumers take a [`snapshot`](SharedConfig::snapshot) per operation
/// (the engine does so on every overflow check), so a
/// [`replace`](SharedConfig::replace) from another task is observed by
/// the next operation without restart.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Config>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn snapshot(&self) -> Config {
        self.inner.read().expect("config lock poisoned").clone()
    }

    pub fn replace(&self, config: Config) {
        *self.inner.write().expect("config lock poisoned") = config;
    }

    /// Re-read from a TOML file and swap in the result.
    pub fn reload_from(&self, path: &Path) -> Result<()> {
        let config = load_config(path)?;
        self.replace(config);
        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
