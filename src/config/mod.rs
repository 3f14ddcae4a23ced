//! Configuration management for rentwatch
//!
//! Configuration comes from a TOML file, then `RENTWATCH_*` environment
//! variables override individual values. The Telegram bot token is only
//! ever read from the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Partition;
use crate::notifications::{BatchPolicy, TelegramConfig};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listing feed
    #[serde(default)]
    pub feed: FeedConfig,

    /// Offer storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Notification transport
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Notification batching
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Sweep pacing and journal
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Daily sweep times
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// HTTP trigger surface
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Partition registry, processed in this order
    #[serde(default = "default_partitions")]
    pub partitions: Vec<PartitionConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            storage: StorageConfig::default(),
            notifier: NotifierConfig::default(),
            dispatch: DispatchConfig::default(),
            sweep: SweepConfig::default(),
            schedule: ScheduleConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            partitions: default_partitions(),
        }
    }
}

/// Listing feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Listing gateway base URL
    pub base_url: String,

    /// Public site used to build offer links
    pub site_url: String,

    /// Listings requested per page
    pub page_size: usize,

    /// Upper bound on pages fetched per partition
    pub max_pages: usize,

    /// Delay between page requests in seconds
    pub page_delay_secs: u64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Retries for 429/5xx responses
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds
    pub retry_base_delay_ms: u64,

    /// User agent string
    pub user_agent: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://gateway.daft.ie/old/v1"),
            site_url: String::from("https://www.daft.ie"),
            page_size: 20,
            max_pages: 50,
            page_delay_secs: 10,
            request_timeout_secs: 30,
            max_retries: 2,
            retry_base_delay_ms: 1000,
            user_agent: format!("rentwatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FeedConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn page_delay(&self) -> Duration {
        Duration::from_secs(self.page_delay_secs)
    }
}

/// Offer storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,

    /// Keep offers in memory only
    pub in_memory: bool,
}

impl StorageConfig {
    /// Lock file guarding sweeps against this store; `None` for in-memory stores
    pub fn lock_path(&self) -> Option<PathBuf> {
        if self.in_memory {
            return None;
        }
        let mut path = self.sqlite_path.clone().into_os_string();
        path.push(".lock");
        Some(PathBuf::from(path))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/rentwatch.db"),
            in_memory: false,
        }
    }
}

/// Notification transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Log messages instead of delivering them
    pub dry_run: bool,

    /// Telegram transport; filled from the environment
    #[serde(skip)]
    pub telegram: Option<TelegramConfig>,

    /// Telegram chat id (token comes from `RENTWATCH_TELEGRAM_TOKEN`)
    pub telegram_chat_id: Option<String>,

    /// Override for the Bot API base URL
    pub telegram_api_base: Option<String>,
}

/// Notification batching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Messages per batch
    pub batch_size: usize,

    /// Pause after a full batch, in seconds
    pub batch_pause_secs: u64,

    /// Pause between new and price-changed groups, in seconds
    pub group_pause_secs: u64,

    /// Currency symbol used in messages
    pub currency: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_pause_secs: 30,
            group_pause_secs: 30,
            currency: String::from("€"),
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub fn policy(&self) -> BatchPolicy {
        BatchPolicy {
            batch_size: self.batch_size,
            batch_pause: Duration::from_secs(self.batch_pause_secs),
            group_pause: Duration::from_secs(self.group_pause_secs),
        }
    }
}

/// Sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Delay between partitions in seconds, 0 disables pacing
    pub partition_pace_secs: u64,

    /// Append-only sweep journal
    pub journal_path: Option<PathBuf>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            partition_pace_secs: 60,
            journal_path: Some(PathBuf::from("data/sweeps.log")),
        }
    }
}

impl SweepConfig {
    #[must_use]
    pub fn pace(&self) -> Duration {
        Duration::from_secs(self.partition_pace_secs)
    }
}

/// Daily schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Run the scheduler in `serve`
    pub enabled: bool,

    /// Local wall-clock times, `HH:MM`
    pub times: Vec<String>,

    /// Start one sweep immediately on startup
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            times: ["08:00", "11:00", "14:00", "17:00", "20:00"]
                .into_iter()
                .map(String::from)
                .collect(),
            run_on_start: false,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 8080,
            enable_cors: false,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// One entry of the partition registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub key: String,
    pub location_id: String,
    #[serde(default)]
    pub routing_key: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

fn default_partitions() -> Vec<PartitionConfig> {
    vec![PartitionConfig {
        key: String::from("donegal"),
        location_id: String::from("35"),
        routing_key: String::new(),
        active: true,
    }]
}

impl From<&PartitionConfig> for Partition {
    fn from(config: &PartitionConfig) -> Self {
        let partition = Partition::new(&config.key, &config.location_id, &config.routing_key);
        if config.active {
            partition
        } else {
            partition.inactive()
        }
    }
}

impl Config {
    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path` when given and present, then apply the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `RENTWATCH_*` overrides
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("RENTWATCH_SQLITE_PATH") {
            self.storage.sqlite_path = PathBuf::from(path);
        }
        if let Some(v) = env_parse::<u64>("RENTWATCH_PARTITION_PACE_SECS") {
            self.sweep.partition_pace_secs = v;
        }
        if let Ok(path) = std::env::var("RENTWATCH_JOURNAL_PATH") {
            self.sweep.journal_path = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        if let Ok(url) = std::env::var("RENTWATCH_FEED_URL") {
            self.feed.base_url = url;
        }
        if let Some(v) = env_parse::<u64>("RENTWATCH_REQUEST_TIMEOUT") {
            self.feed.request_timeout_secs = v;
        }
        if let Ok(host) = std::env::var("RENTWATCH_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("RENTWATCH_PORT") {
            self.server.port = port;
        }
        if let Ok(level) = std::env::var("RENTWATCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("RENTWATCH_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(dry_run) = env_parse::<bool>("RENTWATCH_DRY_RUN") {
            self.notifier.dry_run = dry_run;
        }
        if let Ok(chat_id) = std::env::var("RENTWATCH_TELEGRAM_CHAT_ID") {
            self.notifier.telegram_chat_id = Some(chat_id);
        }

        let token = std::env::var("RENTWATCH_TELEGRAM_TOKEN").ok();
        self.notifier.telegram = match (token, self.notifier.telegram_chat_id.as_ref()) {
            (Some(token), Some(chat_id)) if !token.is_empty() => {
                let telegram = TelegramConfig::new(token, chat_id.clone());
                Some(match &self.notifier.telegram_api_base {
                    Some(base) => telegram.with_api_base(base.clone()),
                    None => telegram,
                })
            }
            _ => None,
        };
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.feed.page_size == 0 {
            anyhow::bail!("feed.page_size must be greater than 0");
        }

        if self.feed.max_pages == 0 {
            anyhow::bail!("feed.max_pages must be greater than 0");
        }

        if self.dispatch.batch_size == 0 {
            anyhow::bail!("dispatch.batch_size must be greater than 0");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        let mut seen = std::collections::HashSet::new();
        for partition in &self.partitions {
            if partition.key.trim().is_empty() {
                anyhow::bail!("partition key cannot be empty");
            }
            if partition.location_id.trim().is_empty() {
                anyhow::bail!("partition '{}' has no location_id", partition.key);
            }
            if !seen.insert(partition.key.as_str()) {
                anyhow::bail!("duplicate partition key '{}'", partition.key);
            }
        }

        for time in &self.schedule.times {
            crate::scheduler::DailyTime::parse(time)
                .map_err(|e| anyhow::anyhow!("schedule.times: {e}"))?;
        }

        if let Some(telegram) = &self.notifier.telegram {
            telegram.validate().map_err(|e| anyhow::anyhow!(e))?;
        }

        Ok(())
    }

    /// Partition registry in processing order
    pub fn partitions(&self) -> Vec<Partition> {
        self.partitions.iter().map(Partition::from).collect()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
