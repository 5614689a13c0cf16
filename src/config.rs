use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use course_reconciler_core::{ReconcileOptions, Strategy};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconcileConfig {
    #[serde(default = "default_strategy")]
    pub default_strategy: String,
    #[serde(default = "default_module_fan_out")]
    pub module_fan_out: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: i64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy(),
            module_fan_out: default_module_fan_out(),
            cache_ttl_secs: default_cache_ttl_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
        }
    }
}

fn default_strategy() -> String {
    "incremental".to_string()
}
fn default_module_fan_out() -> usize {
    4
}
fn default_cache_ttl_secs() -> i64 {
    30
}
fn default_lock_ttl_secs() -> i64 {
    300
}

impl ReconcileConfig {
    /// Parsed `default_strategy`; `load_config` has already validated it.
    pub fn strategy(&self) -> Result<Strategy> {
        self.default_strategy.parse()
    }

    pub fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            module_fan_out: self.module_fan_out,
            cache_ttl_secs: self.cache_ttl_secs,
            lock_ttl_secs: self.lock_ttl_secs,
        }
    }
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
    "127.0.0.1:7340".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate reconcile
    config.reconcile.strategy()?;

    if config.reconcile.module_fan_out == 0 {
        anyhow::bail!("reconcile.module_fan_out must be > 0");
    }

    if config.reconcile.cache_ttl_secs < 0 {
        anyhow::bail!("reconcile.cache_ttl_secs must be >= 0");
    }

    if config.reconcile.lock_ttl_secs < 1 {
        anyhow::bail!("reconcile.lock_ttl_secs must be >= 1");
    }

    Ok(config)
}
