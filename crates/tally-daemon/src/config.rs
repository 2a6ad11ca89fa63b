//! Configuration file management.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_revenue::pumpfun::{PumpfunConfig, DEFAULT_API_BASE_URL, DEFAULT_BUCKET_LIMIT};
use tally_settlement::solana::{Commitment, SolanaConfig};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Creator-fee API settings.
    #[serde(default)]
    pub fees: FeesConfig,
    /// On-chain settlement settings.
    #[serde(default)]
    pub settlement: SettlementConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Bearer key for admin routes. Empty = admin routes always refuse.
    #[serde(default)]
    pub api_key: String,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Creator-fee API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeesConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_fee_timeout")]
    pub timeout_secs: u64,
    /// Daily buckets requested per call.
    #[serde(default = "default_bucket_limit")]
    pub bucket_limit: usize,
    /// Creator wallet for periods that have none recorded.
    #[serde(default)]
    pub default_creator_wallet: String,
}

/// Settlement configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Custodial keypair (Solana CLI JSON format). Empty = claims disabled.
    #[serde(default)]
    pub keypair_path: String,
    /// "processed" | "confirmed" | "finalized".
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_fee_timeout() -> u64 {
    10
}

fn default_bucket_limit() -> usize {
    DEFAULT_BUCKET_LIMIT
}

fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_confirm_timeout() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    1500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            api_key: String::new(),
        }
    }
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            timeout_secs: default_fee_timeout(),
            bucket_limit: default_bucket_limit(),
            default_creator_wallet: String::new(),
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            keypair_path: String::new(),
            commitment: default_commitment(),
            request_timeout_secs: default_request_timeout(),
            confirm_timeout_secs: default_confirm_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from `TALLY_CONFIG` or the default location.
    ///
    /// Falls back to defaults if the file does not exist. `TALLY_API_KEY`
    /// overrides the configured key.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::parse(&content)?
        } else {
            Self::default()
        };
        if let Ok(key) = std::env::var("TALLY_API_KEY") {
            config.server.api_key = key;
        }
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        Commitment::parse(&config.settlement.commitment)?;
        anyhow::ensure!(config.fees.timeout_secs > 0, "fees.timeout_secs must be > 0");
        anyhow::ensure!(config.fees.bucket_limit > 0, "fees.bucket_limit must be > 0");
        Ok(config)
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Creator-fee client settings.
    pub fn pumpfun(&self) -> PumpfunConfig {
        PumpfunConfig {
            base_url: self.fees.api_base_url.clone(),
            timeout: Duration::from_secs(self.fees.timeout_secs),
            bucket_limit: self.fees.bucket_limit,
        }
    }

    /// Solana RPC settings.
    pub fn solana(&self) -> tally_settlement::Result<SolanaConfig> {
        let s = &self.settlement;
        Ok(SolanaConfig {
            rpc_url: s.rpc_url.clone(),
            commitment: Commitment::parse(&s.commitment)?,
            request_timeout: Duration::from_secs(s.request_timeout_secs),
            confirm_timeout: Duration::from_secs(s.confirm_timeout_secs),
            poll_interval: Duration::from_millis(s.poll_interval_ms),
        })
    }

    pub fn default_creator_wallet(&self) -> Option<String> {
        let wallet = self.fees.default_creator_wallet.trim();
        (!wallet.is_empty()).then(|| wallet.to_string())
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TALLY_CONFIG") {
            return PathBuf::from(path);
        }
        Self::default_data_dir().join("config.toml")
    }

    /// Default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("TALLY_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".tally"))
            .unwrap_or_else(|_| PathBuf::from("/var/lib/tally"))
    }
}
