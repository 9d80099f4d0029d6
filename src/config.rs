use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    #[serde(default)]
    pub server: ServerConfig,

    /// Shard routing table, checked in the order it appears here.
    #[serde(default)]
    pub gateways: Vec<ShardConfig>,

    /// Pre-provisioned keys that bypass the database on the hot path.
    #[serde(default)]
    pub access_keys: Vec<AccessKeyEntry>,

    #[serde(default)]
    pub counters: CountersConfig,

    #[serde(default)]
    pub free_account: FreeAccountConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/epochgate.db".to_string(),
            log_level: "info".to_string(),
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    /// Path prefixes (after the version segment) that the gateway refuses to
    /// forward, e.g. "transaction/send".
    pub closed_endpoints: Vec<String>,

    /// Request body size cap in bytes for forwarded requests.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            closed_endpoints: vec![],
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// One shard routing rule. Bounds are strings so the config can carry the
/// "latest" sentinel alongside plain integers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    pub name: String,
    pub url: String,
    pub epoch_start: String,
    pub epoch_end: String,
    pub nonce_start: String,
    pub nonce_end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKeyEntry {
    pub key: String,
    /// Short label used for metrics attribution instead of the raw key.
    pub alias: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountersConfig {
    pub enabled: bool,

    /// Redis connection URL; empty means keep counters in process memory.
    pub url: String,
}

impl Default for CountersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::new(),
        }
    }
}

/// Throttling applied to free accounts on the request path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FreeAccountConfig {
    /// Calls a free account may make per clear period; 0 disables the cap.
    pub max_calls: u64,

    /// Seconds between call counter clears.
    pub clear_period_seconds: u64,
}

impl Default for FreeAccountConfig {
    fn default() -> Self {
        Self {
            max_calls: 10,
            clear_period_seconds: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            gateways: vec![
                ShardConfig {
                    name: "archive".to_string(),
                    url: "http://localhost:8081".to_string(),
                    epoch_start: "0".to_string(),
                    epoch_end: "1000".to_string(),
                    nonce_start: "0".to_string(),
                    nonce_end: "14400000".to_string(),
                },
                ShardConfig {
                    name: "live".to_string(),
                    url: "http://localhost:8082".to_string(),
                    epoch_start: "1001".to_string(),
                    epoch_end: "latest".to_string(),
                    nonce_start: "14400001".to_string(),
                    nonce_end: "latest".to_string(),
                },
            ],
            access_keys: vec![],
            counters: CountersConfig::default(),
            free_account: FreeAccountConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::default_config_path();

        if path.exists() {
            info!("Loading config from: {}", path.display());
            return Self::load_from_path(&path);
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateways.is_empty() {
            anyhow::bail!("At least one gateway shard must be configured");
        }

        for shard in &self.gateways {
            if shard.name.trim().is_empty() {
                anyhow::bail!("Gateway shard name cannot be empty");
            }
            if shard.url.trim().is_empty() {
                anyhow::bail!("Gateway shard '{}' has an empty URL", shard.name);
            }
        }

        if self.free_account.clear_period_seconds == 0 {
            anyhow::bail!("free_account.clear_period_seconds cannot be 0");
        }

        Ok(())
    }
}
