//! Server configuration
//!
//! All settings come from environment variables (a `.env` file is loaded by
//! `dotenvy` in main). Every tunable has a reference default so the server
//! starts with nothing but the ledger credentials set.

use std::path::PathBuf;
use std::time::Duration;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub watcher: WatcherConfig,
    pub transfer: TransferConfig,
    pub ledger: LedgerConfig,
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Root for working directories (split batches, reassembly jobs)
    pub temp_dir: PathBuf,

    /// Public base URL under which merged artifacts are served
    pub public_base_url: String,

    /// API key required by the merge endpoint
    pub merge_api_key: String,
}

/// Backup directory watching settings
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Root of the backup landing tree
    pub backup_dir: PathBuf,

    /// File extensions recognized as backup archives
    pub backup_extensions: Vec<String>,

    /// Interval between file size samples while waiting for stability
    pub stability_poll: Duration,

    /// Attempt ceiling for the stability probe
    pub stability_max_attempts: u32,

    /// Maximum candidates processed concurrently
    pub candidate_concurrency: usize,
}

/// Transfer and reassembly settings
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Files strictly larger than this are split into parts of this size
    pub part_size: u64,

    /// Maximum concurrent part uploads within one batch
    pub upload_concurrency: usize,

    /// Lifetime of a reassembly working directory
    pub reassembly_ttl: Duration,
}

/// Remote task ledger settings
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Base URL of the ledger API
    pub api_url: String,

    /// Bearer credential sent on every call
    pub api_key: String,

    /// List that receives new backup tasks
    pub backups_list: String,

    /// Custom field on domain tasks that links backup tasks
    pub domain_field: String,

    /// Connect/read timeout for ledger calls
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 8080,
                temp_dir: PathBuf::from("/tmp/boveda"),
                public_base_url: "http://localhost:8080/files".to_string(),
                merge_api_key: String::new(),
            },
            watcher: WatcherConfig {
                backup_dir: PathBuf::from("/var/backups/boveda"),
                backup_extensions: vec!["zip".to_string(), "daf".to_string()],
                stability_poll: Duration::from_secs(30),
                stability_max_attempts: 20,
                candidate_concurrency: 4,
            },
            transfer: TransferConfig {
                part_size: 900 * 1024 * 1024,
                upload_concurrency: 3,
                reassembly_ttl: Duration::from_secs(3600),
            },
            ledger: LedgerConfig {
                api_url: "https://api.clickup.com/api/v2".to_string(),
                api_key: String::new(),
                backups_list: String::new(),
                domain_field: String::new(),
                http_timeout: Duration::from_secs(90),
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Self {
            server: ServerConfig {
                port: parse_var("PORT", defaults.server.port)?,
                temp_dir: env_path("TEMP_DIR", defaults.server.temp_dir),
                public_base_url: env_or("PUBLIC_BASE_URL", defaults.server.public_base_url),
                merge_api_key: require_var("MERGE_API_KEY")?,
            },
            watcher: WatcherConfig {
                backup_dir: env_path("BACKUP_DIR", defaults.watcher.backup_dir),
                backup_extensions: env_list("BACKUP_EXTENSIONS", defaults.watcher.backup_extensions),
                stability_poll: Duration::from_secs(parse_var("STABILITY_POLL_SECS", 30u64)?),
                stability_max_attempts: parse_var("STABILITY_MAX_ATTEMPTS", 20u32)?,
                candidate_concurrency: parse_var("CANDIDATE_CONCURRENCY", 4usize)?,
            },
            transfer: TransferConfig {
                part_size: parse_var("PART_SIZE_BYTES", defaults.transfer.part_size)?,
                upload_concurrency: parse_var("UPLOAD_CONCURRENCY", 3usize)?,
                reassembly_ttl: Duration::from_secs(parse_var("REASSEMBLY_TTL_SECS", 3600u64)?),
            },
            ledger: LedgerConfig {
                api_url: env_or("LEDGER_API_URL", defaults.ledger.api_url),
                api_key: require_var("LEDGER_API_KEY")?,
                backups_list: require_var("LEDGER_BACKUPS_LIST")?,
                domain_field: require_var("LEDGER_DOMAIN_FIELD")?,
                http_timeout: Duration::from_secs(parse_var("LEDGER_TIMEOUT_SECS", 90u64)?),
            },
        })
    }
}

fn env_or(var: &'static str, default: String) -> String {
    std::env::var(var).unwrap_or(default)
}

fn env_path(var: &'static str, default: PathBuf) -> PathBuf {
    std::env::var(var).map(PathBuf::from).unwrap_or(default)
}

fn env_list(var: &'static str, default: Vec<String>) -> Vec<String> {
    match std::env::var(var) {
        Ok(value) => value
            .split(',')
            .map(|s| s.trim().trim_start_matches('.').to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default,
    }
}

fn require_var(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::MissingVar(var))
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            var,
            value,
        }),
        Err(_) => Ok(default),
    }
}
