use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub application: ApplicationSettings,
    /// Absent means the in-process cache backend is used.
    pub redis: Option<RedisSettings>,
    pub idempotency: IdempotencySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

/// Settings for the idempotent request middleware.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdempotencySettings {
    /// Lifetime of a cached response in seconds.
    pub ttl_seconds: u64,
    pub header_name: String,
    pub protected_methods: Vec<String>,
    /// Namespace for cache keys, e.g. `request:{fingerprint}`.
    pub key_prefix: String,
    /// Responses with a larger body are still delivered but never cached.
    pub max_cacheable_body_bytes: usize,
    /// Keyed requests with a larger body are rejected with 413.
    pub max_request_body_bytes: usize,
    /// Claim a short-lived marker before running the handler so concurrent
    /// duplicates are rejected instead of executed twice.
    pub in_flight_lock: bool,
    pub lock_ttl_seconds: u64,
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 120,
            header_name: "X-Idempotency-Key".to_string(),
            protected_methods: vec!["POST".to_string(), "PUT".to_string(), "PATCH".to_string()],
            key_prefix: "request".to_string(),
            max_cacheable_body_bytes: 1024 * 1024,
            max_request_body_bytes: 2 * 1024 * 1024,
            in_flight_lock: false,
            lock_ttl_seconds: 30,
        }
    }
}

impl IdempotencySettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// One of `pretty`, `compact` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("idempotency.protected_methods")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}
