//! Configuration module for the multisig client
//!
//! Configuration comes from a TOML file, with `.env` and environment
//! variable overrides applied on top.

use crate::nonce_manager::{PollConfig, RetryConfig};
use crate::tx_builder::TransportEncoding;
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `rpc.url`
pub const RPC_URL_ENV: &str = "MULTISIG_RPC_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rpc: RpcConfig,
    pub keys: KeysConfig,
    pub nonce: NonceConfig,
    pub flow: FlowConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Cluster endpoint
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// processed | confirmed | finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Max attempts per read-only request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Pays fees, owns the nonce account and the mint
    #[serde(default = "default_admin_keypair")]
    pub admin_keypair: PathBuf,

    /// Remote co-signer
    #[serde(default = "default_second_keypair")]
    pub second_keypair: PathBuf,

    /// Deployed program keypair; only its public key is used
    #[serde(default = "default_program_keypair")]
    pub program_keypair: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceConfig {
    /// Delay before the first nonce account read
    #[serde(default = "default_poll_ms")]
    pub initial_delay_ms: u64,

    /// Fixed delay between reads
    #[serde(default = "default_poll_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Overall deadline for the account to appear
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Encoding of the partial transaction handed to the second signer
    #[serde(default)]
    pub transport_encoding: TransportEncoding,

    /// Pause before the co-signed transaction is submitted
    #[serde(default = "default_poll_ms")]
    pub submit_delay_ms: u64,

    /// Withdraw the nonce account's balance after submission
    #[serde(default)]
    pub close_nonce_after_submit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Log the Prometheus text dump at the end of the run
    #[serde(default)]
    pub dump_metrics: bool,
}

// Default value functions
fn default_rpc_url() -> String { "https://api.devnet.solana.com".to_string() }
fn default_commitment() -> String { "finalized".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_max_retries() -> u32 { 3 }
fn default_admin_keypair() -> PathBuf { PathBuf::from("keys/adminaccount.json") }
fn default_second_keypair() -> PathBuf { PathBuf::from("keys/secondaccount.json") }
fn default_program_keypair() -> PathBuf { PathBuf::from("program/mint-nft/target/deploy/mint_nft-keypair.json") }
fn default_poll_ms() -> u64 { 500 }
fn default_max_poll_attempts() -> u32 { PollConfig::default().max_attempts }
fn default_poll_timeout() -> u64 { PollConfig::default().timeout.as_secs() }
fn default_log_filter() -> String { "durable_multisig=info,warn".to_string() }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            commitment: default_commitment(),
            timeout_secs: default_rpc_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            admin_keypair: default_admin_keypair(),
            second_keypair: default_second_keypair(),
            program_keypair: default_program_keypair(),
        }
    }
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_poll_ms(),
            poll_interval_ms: default_poll_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            transport_encoding: TransportEncoding::default(),
            submit_delay_ms: default_poll_ms(),
            close_nonce_after_submit: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
            dump_metrics: false,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration with `.env` and environment variable overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(RPC_URL_ENV) {
            if !url.trim().is_empty() {
                self.rpc.url = url.trim().to_string();
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rpc.url.starts_with("http://") || self.rpc.url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "rpc.url must be an http(s) URL, got '{}'",
                self.rpc.url
            )));
        }
        self.commitment()?;
        if self.rpc.timeout_secs == 0 {
            return Err(ConfigError::Invalid("rpc.timeout_secs must be positive".to_string()));
        }
        if self.rpc.max_retries == 0 {
            return Err(ConfigError::Invalid("rpc.max_retries must be at least 1".to_string()));
        }
        if self.nonce.max_poll_attempts == 0 {
            return Err(ConfigError::Invalid(
                "nonce.max_poll_attempts must be at least 1".to_string(),
            ));
        }
        if self.nonce.poll_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "nonce.poll_timeout_secs must be positive".to_string(),
            ));
        }
        if self.keys.admin_keypair == self.keys.second_keypair {
            return Err(ConfigError::Invalid(
                "keys.admin_keypair and keys.second_keypair must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn commitment(&self) -> Result<CommitmentConfig, ConfigError> {
        match self.rpc.commitment.as_str() {
            "processed" => Ok(CommitmentConfig::processed()),
            "confirmed" => Ok(CommitmentConfig::confirmed()),
            "finalized" => Ok(CommitmentConfig::finalized()),
            other => Err(ConfigError::Invalid(format!(
                "rpc.commitment must be processed, confirmed or finalized, got '{}'",
                other
            ))),
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_secs)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.rpc.max_retries,
            ..RetryConfig::default()
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            initial_delay: Duration::from_millis(self.nonce.initial_delay_ms),
            interval: Duration::from_millis(self.nonce.poll_interval_ms),
            max_attempts: self.nonce.max_poll_attempts,
            timeout: Duration::from_secs(self.nonce.poll_timeout_secs),
        }
    }
}
