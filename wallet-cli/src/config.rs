//! CLI configuration
//!
//! Stored as `config.toml` in the data directory (`~/.shelley-wallet`
//! unless overridden). A default file is written on first run.

use serde::{Deserialize, Serialize};
use shelley_wallet::{NetworkType, DEFAULT_GAP_LIMIT};
use std::fs;
use std::path::{Path, PathBuf};

const PROJECT_ID_ENV: &str = "BLOCKFROST_PROJECT_ID";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network type ("mainnet" or "testnet")
    #[serde(default = "default_network")]
    pub network: String,

    /// Consecutive unused addresses that end a discovery scan.
    #[serde(default = "default_gap_limit")]
    pub gap_limit: u32,

    #[serde(default)]
    pub usage_oracle: UsageOracleConfig,

    /// Local data directory (set at runtime, not serialized).
    #[serde(skip)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageOracleConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Blockfrost project id; `BLOCKFROST_PROJECT_ID` takes precedence.
    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_network() -> String {
    "mainnet".to_string()
}

fn default_gap_limit() -> u32 {
    DEFAULT_GAP_LIMIT
}

fn default_endpoint() -> String {
    "https://cardano-mainnet.blockfrost.io/api/v0".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for UsageOracleConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            project_id: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: default_network(),
            gap_limit: default_gap_limit(),
            usage_oracle: UsageOracleConfig::default(),
            data_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from `data_dir`, or the default data directory
    pub fn load(data_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let data_dir = match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => Self::default_data_dir()?,
        };
        let config_path = data_dir.join("config.toml");

        let mut config = if config_path.exists() {
            log::info!("Loading config from: {}", config_path.display());
            let contents = fs::read_to_string(&config_path)?;
            let mut config: Config = toml::from_str(&contents)?;
            config.data_dir = Some(data_dir);
            config
        } else {
            log::info!("Creating default config");
            let config = Config {
                data_dir: Some(data_dir),
                ..Config::default()
            };
            config.save()?;
            config
        };

        if let Ok(project_id) = std::env::var(PROJECT_ID_ENV) {
            if !project_id.trim().is_empty() {
                config.usage_oracle.project_id = Some(project_id);
            }
        }

        config.validate()?;
        log::info!(
            "Config loaded: network={}, gap_limit={}",
            config.network,
            config.gap_limit
        );
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), ConfigError> {
        let data_dir = self.data_dir()?;
        fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join("config.toml");
        let contents = toml::to_string_pretty(self)?;
        fs::write(&config_path, contents)?;
        log::info!("Config saved to: {}", config_path.display());
        Ok(())
    }

    pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        path.push(".shelley-wallet");
        Ok(path)
    }

    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::default_data_dir(),
        }
    }

    /// Sled database directory for the current network
    pub fn store_dir(&self) -> Result<PathBuf, ConfigError> {
        let mut path = self.data_dir()?;
        path.push("store");
        path.push(&self.network);
        Ok(path)
    }

    pub fn network_type(&self) -> Result<NetworkType, ConfigError> {
        self.network
            .parse()
            .map_err(|_| ConfigError::InvalidNetwork(self.network.clone()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network != "mainnet" && self.network != "testnet" {
            return Err(ConfigError::InvalidNetwork(self.network.clone()));
        }
        if self.gap_limit == 0 {
            return Err(ConfigError::InvalidGapLimit(self.gap_limit));
        }

        let endpoint = &self.usage_oracle.endpoint;
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidEndpoint(endpoint.clone()));
        }
        if self.usage_oracle.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Home directory not found")]
    NoHomeDir,

    #[error("Invalid network: {0} (must be 'mainnet' or 'testnet')")]
    InvalidNetwork(String),

    #[error("Invalid gap limit: {0} (must be at least 1)")]
    InvalidGapLimit(u32),

    #[error("Invalid endpoint: {0} (must start with http:// or https://)")]
    InvalidEndpoint(String),

    #[error("Usage oracle timeout must be at least one second")]
    InvalidTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("shelley-wallet-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network, "mainnet");
        assert_eq!(config.gap_limit, 20);
        assert_eq!(config.usage_oracle.timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();

        config.network = "invalid".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidNetwork(_))));

        config.network = "testnet".to_string();
        config.gap_limit = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidGapLimit(0))));

        config.gap_limit = 20;
        config.usage_oracle.endpoint = "ftp://example.com".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("network = \"testnet\"\n").unwrap();
        assert_eq!(config.network, "testnet");
        assert_eq!(config.gap_limit, 20);
        assert!(config.usage_oracle.endpoint.starts_with("https://"));
        assert_eq!(config.network_type().unwrap(), NetworkType::Testnet);
    }

    #[test]
    fn test_serialization() {
        let config = Config {
            gap_limit: 7,
            ..Config::default()
        };
        let toml = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml).unwrap();
        assert_eq!(deserialized.gap_limit, 7);
        assert_eq!(config.network, deserialized.network);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = temp_dir("load");
        let config = Config::load(Some(&dir)).unwrap();
        assert!(dir.join("config.toml").exists());
        assert_eq!(config.store_dir().unwrap(), dir.join("store").join("mainnet"));

        let again = Config::load(Some(&dir)).unwrap();
        assert_eq!(again.network, config.network);
        let _ = fs::remove_dir_all(&dir);
    }
}
