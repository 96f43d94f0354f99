use std::{fs, path::Path, path::PathBuf, time::Duration};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default datadir.
const DEFAULT_DATADIR: &str = "taskledger-data";

/// Default number of submission attempts per call.
const DEFAULT_MAX_ATTEMPTS: u16 = 3;

/// Delay before the first retry, doubled afterwards.
const DEFAULT_INITIAL_RETRY_DELAY_MS: u64 = 2_000;

const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 30;

const DEFAULT_RECEIPT_POLL_INTERVAL_MS: u64 = 1_000;

/// Gas limit used when estimation fails transiently.
const DEFAULT_GAS_LIMIT: u64 = 2_000_000;

const DEFAULT_GAS_SAFETY_FACTOR: f64 = 2.0;

const DEFAULT_GAS_BUFFER_FACTOR: f64 = 1.5;

const DEFAULT_DB_RETRY_COUNT: u16 = 3;

const DEFAULT_DB_RETRY_DELAY_MS: u64 = 150;

const DEFAULT_CACHE_CAPACITY: usize = 1024;

const DEFAULT_RECENT_TASKS: u64 = 10;

const DEFAULT_RPC_MAX_RETRIES: u16 = 1;

const DEFAULT_RPC_RETRY_DELAY_MS: u64 = 250;

fn default_datadir() -> PathBuf {
    DEFAULT_DATADIR.into()
}

fn default_max_attempts() -> u16 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_initial_retry_delay_ms() -> u64 {
    DEFAULT_INITIAL_RETRY_DELAY_MS
}

fn default_receipt_timeout_secs() -> u64 {
    DEFAULT_RECEIPT_TIMEOUT_SECS
}

fn default_receipt_poll_interval_ms() -> u64 {
    DEFAULT_RECEIPT_POLL_INTERVAL_MS
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

fn default_gas_safety_factor() -> f64 {
    DEFAULT_GAS_SAFETY_FACTOR
}

fn default_gas_buffer_factor() -> f64 {
    DEFAULT_GAS_BUFFER_FACTOR
}

fn default_db_retry_count() -> u16 {
    DEFAULT_DB_RETRY_COUNT
}

fn default_db_retry_delay_ms() -> u64 {
    DEFAULT_DB_RETRY_DELAY_MS
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_recent_tasks() -> u64 {
    DEFAULT_RECENT_TASKS
}

fn default_rpc_max_retries() -> u16 {
    DEFAULT_RPC_MAX_RETRIES
}

fn default_rpc_retry_delay_ms() -> u64 {
    DEFAULT_RPC_RETRY_DELAY_MS
}

/// Ledger endpoint and contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub contract_address: Address,
    /// Queried from the node when unset.
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// Retries for read-only RPC calls.
    #[serde(default = "default_rpc_max_retries")]
    pub rpc_max_retries: u16,
    #[serde(default = "default_rpc_retry_delay_ms")]
    pub rpc_retry_delay_ms: u64,
}

/// Transaction submission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitterConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u16,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,
    /// Multiplier applied to the raw gas estimate.
    #[serde(default = "default_gas_safety_factor")]
    pub gas_safety_factor: f64,
    /// Second multiplier applied when building the transaction.
    #[serde(default = "default_gas_buffer_factor")]
    pub gas_buffer_factor: f64,
}

impl SubmitterConfig {
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_retry_delay_ms: DEFAULT_INITIAL_RETRY_DELAY_MS,
            receipt_timeout_secs: DEFAULT_RECEIPT_TIMEOUT_SECS,
            receipt_poll_interval_ms: DEFAULT_RECEIPT_POLL_INTERVAL_MS,
            default_gas_limit: DEFAULT_GAS_LIMIT,
            gas_safety_factor: DEFAULT_GAS_SAFETY_FACTOR,
            gas_buffer_factor: DEFAULT_GAS_BUFFER_FACTOR,
        }
    }
}

/// Local result store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_datadir")]
    pub datadir: PathBuf,
    #[serde(default = "default_db_retry_count")]
    pub db_retry_count: u16,
    #[serde(default = "default_db_retry_delay_ms")]
    pub db_retry_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            datadir: default_datadir(),
            db_retry_count: DEFAULT_DB_RETRY_COUNT,
            db_retry_delay_ms: DEFAULT_DB_RETRY_DELAY_MS,
        }
    }
}

/// Task resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Entries per in-memory cache table.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_recent_tasks")]
    pub recent_tasks_default: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            recent_tasks_default: DEFAULT_RECENT_TASKS,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Label appended to the service name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_label: Option<String>,

    /// OTLP endpoint for span export.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otlp_url: Option<String>,

    /// Directory for file-based logging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file_prefix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_format: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub submitter: SubmitterConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Reads and validates a TOML config file.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.submitter.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "submitter.max_attempts must be at least 1".into(),
            ));
        }
        if self.submitter.gas_safety_factor < 1.0 || self.submitter.gas_buffer_factor < 1.0 {
            return Err(ConfigError::Invalid(
                "gas factors must be at least 1.0".into(),
            ));
        }
        if self.resolver.cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "resolver.cache_capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    const MINIMAL: &str = r#"
        [ledger]
        rpc_url = "http://localhost:8545"
        contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.submitter.max_attempts, 3);
        assert_eq!(config.submitter.initial_retry_delay_ms, 2_000);
        assert_eq!(config.submitter.receipt_timeout(), Duration::from_secs(30));
        assert_eq!(config.submitter.gas_safety_factor, 2.0);
        assert_eq!(config.submitter.gas_buffer_factor, 1.5);
        assert_eq!(config.store.datadir, PathBuf::from("taskledger-data"));
        assert_eq!(config.resolver.recent_tasks_default, 10);
        assert!(config.ledger.chain_id.is_none());
        assert!(config.logging.otlp_url.is_none());
    }

    #[test]
    fn test_config_load() {
        let config_string = r#"
            [ledger]
            rpc_url = "https://rpc.example.org"
            contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
            chain_id = 5003

            [submitter]
            max_attempts = 5
            receipt_timeout_secs = 60
            default_gas_limit = 3000000

            [store]
            datadir = "/var/lib/taskledger"
            db_retry_count = 5

            [resolver]
            cache_capacity = 64

            [logging]
            service_label = "prod"
            json_format = true
        "#;

        let config = toml::from_str::<Config>(config_string);
        assert!(
            config.is_ok(),
            "should be able to load TOML config but got: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.ledger.chain_id, Some(5003));
        assert_eq!(config.submitter.max_attempts, 5);
        assert_eq!(config.submitter.receipt_poll_interval_ms, 1_000);
        assert_eq!(config.store.db_retry_count, 5);
        assert_eq!(config.resolver.cache_capacity, 64);
        assert_eq!(config.logging.json_format, Some(true));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let raw = format!("{MINIMAL}\n[submitter]\nmax_attempts = 0\n");
        assert!(matches!(
            Config::from_toml_str(&raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.ledger.rpc_url, "http://localhost:8545");

        let missing = Config::load_from_path(Path::new("/nonexistent/taskledger.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
