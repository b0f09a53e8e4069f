//! Configuration for the sync engine.

use crate::error::{ConfigError, ConfigResult};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tandem_stores::{PrimaryConfig, RetryPolicy, SchemaMapping, SecondaryConfig};

/// Health document location when `SYNC_HEALTH_FILE` is unset.
const DEFAULT_HEALTH_FILE: &str = "logs/last_success.json";

/// Configuration for sync passes.
#[derive(Clone, PartialEq)]
pub struct SyncConfig {
    /// Primary store project URL.
    pub primary_url: String,
    /// Primary store service key.
    pub primary_key: String,
    /// Primary store table.
    pub primary_table: String,
    /// Secondary store integration token.
    pub secondary_token: String,
    /// Secondary store database id.
    pub secondary_database_id: String,
    /// Secondary store API root.
    pub secondary_api_url: String,
    /// Secondary store API version header.
    pub secondary_api_version: String,
    /// Records per page.
    pub batch_size: usize,
    /// Attempts per network call, including the first.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub retry_delay: Duration,
    /// Pause between page requests.
    pub rate_limit_delay: Duration,
    /// Time between scheduled passes.
    pub interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Path of the health document.
    pub health_file: PathBuf,
    /// Categories the secondary store accepts; empty means any.
    pub allowed_categories: Vec<String>,
}

impl SyncConfig {
    /// Creates a configuration with default tunables.
    pub fn new(
        primary_url: impl Into<String>,
        primary_key: impl Into<String>,
        secondary_token: impl Into<String>,
        secondary_database_id: impl Into<String>,
    ) -> Self {
        Self {
            primary_url: primary_url.into(),
            primary_key: primary_key.into(),
            primary_table: "decision_vault".to_string(),
            secondary_token: secondary_token.into(),
            secondary_database_id: secondary_database_id.into(),
            secondary_api_url: "https://api.notion.com/v1".to_string(),
            secondary_api_version: "2022-06-28".to_string(),
            batch_size: 100,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            rate_limit_delay: Duration::from_millis(500),
            interval: Duration::from_secs(15 * 60),
            request_timeout: Duration::from_secs(30),
            health_file: PathBuf::from(DEFAULT_HEALTH_FILE),
            allowed_categories: Vec::new(),
        }
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Health document path from the environment, without requiring
    /// credentials.
    pub fn health_file_from_env() -> PathBuf {
        std::env::var("SYNC_HEALTH_FILE")
            .ok()
            .map(|path| path.trim().to_string())
            .filter(|path| !path.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_HEALTH_FILE), PathBuf::from)
    }

    /// Reads the configuration through `lookup`.
    ///
    /// Empty values count as missing. Every missing required key is reported
    /// in a single [`ConfigError::Missing`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut missing = Vec::new();
        let mut required = |key: &str, fallback: Option<&str>| {
            let value = get(key).or_else(|| fallback.and_then(|alt| get(alt)));
            if value.is_none() {
                missing.push(key.to_string());
            }
            value.unwrap_or_default()
        };
        let primary_url = required("SUPABASE_URL", None);
        let primary_key = required("SUPABASE_SERVICE_ROLE_KEY", None);
        let secondary_token = required("NOTION_API_KEY", Some("NOTION_TOKEN"));
        let database_id = required("NOTION_DATABASE_ID", None);
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let mut config = Self::new(primary_url, primary_key, secondary_token, database_id);
        if let Some(table) = get("SUPABASE_TABLE") {
            config.primary_table = table;
        }
        if let Some(url) = get("NOTION_API_URL") {
            config.secondary_api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(version) = get("NOTION_VERSION") {
            config.secondary_api_version = version;
        }
        if let Some(size) = parse::<usize>(&get, "SYNC_BATCH_SIZE")? {
            config.batch_size = positive("SYNC_BATCH_SIZE", size)?;
        }
        if let Some(retries) = parse::<u32>(&get, "SYNC_MAX_RETRIES")? {
            config.max_retries = positive("SYNC_MAX_RETRIES", retries)?;
        }
        if let Some(secs) = parse_secs(&get, "SYNC_RETRY_DELAY_SECS")? {
            config.retry_delay = secs;
        }
        if let Some(secs) = parse_secs(&get, "SYNC_RATE_LIMIT_DELAY_SECS")? {
            config.rate_limit_delay = secs;
        }
        if let Some(minutes) = parse::<u64>(&get, "SYNC_INTERVAL_MINUTES")? {
            config.interval = Duration::from_secs(positive("SYNC_INTERVAL_MINUTES", minutes)? * 60);
        }
        if let Some(secs) = parse_secs(&get, "SYNC_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = secs;
        }
        if let Some(path) = get("SYNC_HEALTH_FILE") {
            config.health_file = PathBuf::from(path);
        }
        if let Some(list) = get("SYNC_ALLOWED_CATEGORIES") {
            config.allowed_categories = list
                .split(',')
                .map(str::trim)
                .filter(|category| !category.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(config)
    }

    /// Sets the primary store table.
    pub fn with_primary_table(mut self, table: impl Into<String>) -> Self {
        self.primary_table = table.into();
        self
    }

    /// Sets the secondary store API root.
    pub fn with_secondary_api_url(mut self, url: impl Into<String>) -> Self {
        self.secondary_api_url = url.into();
        self
    }

    /// Sets the page size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the number of attempts per call.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the backoff base delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the pause between pages.
    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    /// Sets the scheduler interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the health document path.
    pub fn with_health_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.health_file = path.into();
        self
    }

    /// Restricts the categories written to the secondary store.
    pub fn with_allowed_categories(mut self, categories: Vec<String>) -> Self {
        self.allowed_categories = categories;
        self
    }

    /// Retry policy shared by both adapters.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries).with_initial_delay(self.retry_delay)
    }

    /// Connection settings for the primary adapter.
    pub fn primary_config(&self) -> PrimaryConfig {
        PrimaryConfig::new(&self.primary_url, &self.primary_key, &self.primary_table)
            .with_page_size(self.batch_size)
            .with_page_delay(self.rate_limit_delay)
    }

    /// Connection settings for the secondary adapter.
    pub fn secondary_config(&self) -> SecondaryConfig {
        SecondaryConfig::new(&self.secondary_token, &self.secondary_database_id)
            .with_api_url(&self.secondary_api_url)
            .with_api_version(&self.secondary_api_version)
            .with_page_size(self.batch_size)
            .with_page_delay(self.rate_limit_delay)
    }

    /// Schema mapping for the secondary adapter.
    pub fn schema_mapping(&self) -> SchemaMapping {
        SchemaMapping::decision_log().with_allowed_categories(self.allowed_categories.clone())
    }

    /// Lock file guarding passes across processes.
    pub fn lock_file(&self) -> PathBuf {
        self.health_file.with_extension("lock")
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("primary_url", &self.primary_url)
            .field("primary_key", &"<redacted>")
            .field("primary_table", &self.primary_table)
            .field("secondary_token", &"<redacted>")
            .field("secondary_database_id", &self.secondary_database_id)
            .field("secondary_api_url", &self.secondary_api_url)
            .field("secondary_api_version", &self.secondary_api_version)
            .field("batch_size", &self.batch_size)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("rate_limit_delay", &self.rate_limit_delay)
            .field("interval", &self.interval)
            .field("request_timeout", &self.request_timeout)
            .field("health_file", &self.health_file)
            .field("allowed_categories", &self.allowed_categories)
            .finish()
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(key) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_secs(get: &impl Fn(&str) -> Option<String>, key: &str) -> ConfigResult<Option<Duration>> {
    match parse::<f64>(get, key)? {
        None => Ok(None),
        Some(secs) if secs.is_finite() && secs >= 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
        Some(secs) => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: secs.to_string(),
            reason: "must be a non-negative number of seconds".into(),
        }),
    }
}

fn positive<T: PartialOrd + Default + ToString>(key: &str, value: T) -> ConfigResult<T> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        })
    }
}
