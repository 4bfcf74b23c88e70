use std::collections::HashMap;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder};
use serde::Deserialize;

use crate::constants;
use crate::error::CoreResult;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub upstream: UpstreamConfig,
    pub telegram: TelegramConfig,
    pub tracker: TrackerConfig,
    pub delivery: DeliveryConfig,
    pub cache: CacheConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u8,
}

/// Upstream catalog API connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub store_id: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub max_session_age_days: i64,
    /// Maps a substore alias to the id the products endpoint expects.
    /// Aliases missing from the map are sent as-is.
    #[serde(default)]
    pub substore_ids: HashMap<String, String>,
}

impl UpstreamConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: constants::DEFAULT_UPSTREAM_BASE_URL.to_string(),
            store_id: constants::DEFAULT_UPSTREAM_STORE_ID.to_string(),
            user_agent: constants::DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 30,
            max_session_age_days: constants::MAX_SESSION_AGE_DAYS,
            substore_ids: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_base_url: String,
    /// Username used to build `?start=` deep links in notifications.
    pub bot_username: Option<String>,
    /// Operator chat that receives cycle summaries and errors.
    pub log_channel_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub region_pause_ms: u64,
    pub warm_up_pause_secs: u64,
}

impl TrackerConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub const fn region_pause(&self) -> Duration {
        Duration::from_millis(self.region_pause_ms)
    }

    #[must_use]
    pub const fn warm_up_pause(&self) -> Duration {
        Duration::from_secs(self.warm_up_pause_secs)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            region_pause_ms: 500,
            warm_up_pause_secs: 5,
        }
    }
}

/// Outbound message queue limits.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Messages allowed per `rate_limit_window_ms`, enforced queue-wide.
    pub rate_limit_max: u32,
    pub rate_limit_window_ms: u64,
    pub concurrency: usize,
    /// Send attempts per job, including the first one.
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub queue_capacity: usize,
}

impl DeliveryConfig {
    #[must_use]
    pub const fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            rate_limit_max: 30,
            rate_limit_window_ms: 2000,
            concurrency: 5,
            max_attempts: 1,
            retry_backoff_ms: 1000,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub read_ttl_secs: u64,
    pub job_ttl_secs: u64,
}

impl CacheConfig {
    #[must_use]
    pub const fn read_ttl(&self) -> Duration {
        Duration::from_secs(self.read_ttl_secs)
    }

    #[must_use]
    pub const fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            read_ttl_secs: 5 * 60,
            job_ttl_secs: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// IANA timezone used for day keys and the daily report.
    pub timezone: String,
    /// Local `HH:MM` at which the daily activity report fires.
    pub report_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    /// ## Summary
    /// Loads configuration from `.env` file and environment variables into a `Settings`.
    /// Environment variables take precedence over `config.toml` values.
    ///
    /// ## Errors
    /// `ConfigError` if building the configuration or deserializing it fails.
    pub fn load() -> CoreResult<Self> {
        Self::from_builder(
            Self::with_defaults()?
                // TOML file
                .add_source(config::File::with_name("config.toml").required(false))
                // Env, e.g. STOCKWATCH__TELEGRAM__BOT_TOKEN
                .add_source(
                    config::Environment::with_prefix("STOCKWATCH")
                        .prefix_separator("__")
                        .separator("__")
                        .ignore_empty(true)
                        .try_parsing(true),
                ),
        )
    }

    fn with_defaults() -> CoreResult<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("database.max_connections", 4)?
            .set_default("upstream.base_url", constants::DEFAULT_UPSTREAM_BASE_URL)?
            .set_default("upstream.store_id", constants::DEFAULT_UPSTREAM_STORE_ID)?
            .set_default("upstream.user_agent", constants::DEFAULT_USER_AGENT)?
            .set_default("upstream.request_timeout_secs", 30)?
            .set_default(
                "upstream.max_session_age_days",
                constants::MAX_SESSION_AGE_DAYS,
            )?
            .set_default("telegram.api_base_url", constants::DEFAULT_TELEGRAM_API_URL)?
            .set_default("tracker.enabled", true)?
            .set_default("tracker.interval_secs", 60)?
            .set_default("tracker.region_pause_ms", 500)?
            .set_default("tracker.warm_up_pause_secs", 5)?
            .set_default("delivery.rate_limit_max", 30)?
            .set_default("delivery.rate_limit_window_ms", 2000)?
            .set_default("delivery.concurrency", 5)?
            .set_default("delivery.max_attempts", 1)?
            .set_default("delivery.retry_backoff_ms", 1000)?
            .set_default("delivery.queue_capacity", 1024)?
            .set_default("cache.read_ttl_secs", 5 * 60)?
            .set_default("cache.job_ttl_secs", 15 * 60)?
            .set_default("schedule.timezone", constants::DEFAULT_TIMEZONE)?
            .set_default("schedule.report_time", "23:59")?
            .set_default("logging.level", "debug")?)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> CoreResult<Self> {
        Ok(builder.build()?.try_deserialize::<Settings>()?)
    }
}

/// ## Summary
/// Loads configuration from environment variables and `.env` file.
///
/// ## Errors
/// `ConfigError` if loading or deserializing the configuration fails.
pub fn load_config() -> CoreResult<Settings> {
    dotenvy::dotenv().ok();

    Settings::load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test_log::test]
    fn delivery_defaults_match_reference_budget() {
        let config = DeliveryConfig::default();
        assert_eq!(config.rate_limit_max, 30);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(2));
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn cache_ttls_differ_per_region() {
        let config = CacheConfig::default();
        assert_eq!(config.read_ttl(), Duration::from_secs(300));
        assert_eq!(config.job_ttl(), Duration::from_secs(900));
        assert!(config.job_ttl() > config.read_ttl());
    }

    #[test]
    fn upstream_default_session_age() {
        let config = UpstreamConfig::default();
        assert_eq!(config.max_session_age_days, 5);
        assert!(config.substore_ids.is_empty());
    }

    #[test]
    fn tracker_durations() {
        let config = TrackerConfig::default();
        assert_eq!(config.interval(), Duration::from_secs(60));
        assert_eq!(config.region_pause(), Duration::from_millis(500));
        assert_eq!(config.warm_up_pause(), Duration::from_secs(5));
    }

    #[test]
    fn missing_required_keys_is_config_error() {
        let err = Settings::from_builder(Settings::with_defaults().unwrap()).unwrap_err();
        assert!(matches!(err, CoreError::ConfigError(_)), "{err:?}");
    }

    #[test]
    fn defaults_fill_everything_but_secrets() {
        let builder = Settings::with_defaults()
            .unwrap()
            .set_override("database.url", "postgres://localhost/stockwatch")
            .unwrap()
            .set_override("telegram.bot_token", "123:abc")
            .unwrap();
        let settings = Settings::from_builder(builder).unwrap();

        assert_eq!(settings.database.max_connections, 4);
        assert_eq!(settings.delivery.rate_limit_max, 30);
        assert_eq!(settings.schedule.report_time, "23:59");
        assert!(settings.telegram.log_channel_id.is_none());
        assert!(settings.upstream.substore_ids.is_empty());
    }
}
