use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::address::{AddressCodec, DEFAULT_FORMAT};
use crate::error::{IdentityError, Result};
use crate::signer::local::DEFAULT_MAX_ATTEMPTS;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct IdentityConfig {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub balance: BalanceConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChainConfig {
    /// Live SS58 prefix; unset means "not known yet".
    #[serde(default)]
    pub format_prefix: Option<u16>,
    #[serde(default = "default_format_prefix")]
    pub default_format_prefix: u16,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_format_prefix() -> u16 {
    DEFAULT_FORMAT
}

fn default_decimals() -> u8 {
    12
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            format_prefix: None,
            default_format_prefix: DEFAULT_FORMAT,
            decimals: default_decimals(),
        }
    }
}

impl ChainConfig {
    pub fn codec(&self) -> AddressCodec {
        AddressCodec::new(self.format_prefix).with_default_format(self.default_format_prefix)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_path() -> String {
    "./data/identity.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BalanceConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_rpc_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    6000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SignerConfig {
    #[serde(default = "default_max_passphrase_attempts")]
    pub max_passphrase_attempts: u32,
}

fn default_max_passphrase_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            max_passphrase_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl IdentityConfig {
    /// Strict load: a missing or malformed file is an error.
    pub fn load(path: &str) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| IdentityError::Config(format!("Error reading {}: {}", path, e)))?;
        toml::from_str(&s).map_err(|e| IdentityError::Config(format!("Error parsing {}: {}", path, e)))
    }

    pub fn load_or_default(path: &str) -> Self {
        if std::path::Path::new(path).exists() {
            match Self::load(path) {
                Ok(config) => {
                    info!("Config loaded from {}", path);
                    config
                }
                Err(e) => {
                    warn!("{}. Using defaults.", e);
                    Self::default()
                }
            }
        } else {
            info!("Config file not found at '{}'. Creating default.", path);
            let config = Self::default();
            match toml::to_string_pretty(&config) {
                Ok(s) => {
                    if let Err(e) = std::fs::write(path, s) {
                        warn!("Could not write default config to {}: {}", path, e);
                    }
                }
                Err(e) => warn!("Could not serialize default config: {}", e),
            }
            config
        }
    }
}
