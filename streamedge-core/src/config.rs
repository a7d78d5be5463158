use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default cadence at which origins are expected to heartbeat.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 5;

/// TTL = heartbeat interval * multiplier. A multiplier of 3 tolerates two
/// consecutive missed heartbeats before a stream disappears.
pub const DEFAULT_TTL_MULTIPLIER: u64 = 3;

/// Memory tier capacity in fragments.
pub const DEFAULT_MEMORY_CAPACITY: usize = 60;

/// Origin downloads slower than this are reported to the slow-path monitor.
pub const DEFAULT_SLOW_THRESHOLD_MS: u64 = 2000;

const _: () = assert!(
    DEFAULT_TTL_MULTIPLIER >= 3,
    "TTL must be at least 3x the heartbeat interval"
);

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub cache: CacheConfig,
    pub origin: OriginConfig,
    pub slow_path: SlowPathConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub heartbeat_interval_secs: u64,
    pub ttl_multiplier: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            ttl_multiplier: DEFAULT_TTL_MULTIPLIER,
        }
    }
}

impl RegistryConfig {
    /// Maximum heartbeat silence before a stream is considered gone
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs * self.ttl_multiplier)
    }

    /// Background sweep runs at half the TTL
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        self.ttl() / 2
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub memory_capacity: usize,
    pub disk_path: PathBuf,
    /// Delete fragment files older than this. `None` keeps them forever.
    pub disk_retention_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            disk_path: PathBuf::from("./fragment_cache"),
            disk_retention_secs: None,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn disk_retention(&self) -> Option<Duration> {
        self.disk_retention_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    pub request_timeout_secs: u64,
    pub slow_threshold_ms: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            slow_threshold_ms: DEFAULT_SLOW_THRESHOLD_MS,
        }
    }
}

impl OriginConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }
}

/// What to do when an origin is slow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SlowPathPolicyKind {
    /// Log the event and do nothing else
    #[default]
    LogOnly,
    /// Drop the stream from the registry after repeated slow fetches
    Deregister,
    /// Tell the origin it is too slow (POST {origin}/bandwidth)
    NotifyOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowPathConfig {
    pub policy: SlowPathPolicyKind,
    /// Slow events within `window_secs` that trigger deregistration
    pub threshold: u32,
    pub window_secs: u64,
    /// Pending events beyond this are dropped
    pub queue_capacity: usize,
}

impl Default for SlowPathConfig {
    fn default() -> Self {
        Self {
            policy: SlowPathPolicyKind::LogOnly,
            threshold: 3,
            window_secs: 30,
            queue_capacity: 1024,
        }
    }
}

impl SlowPathConfig {
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            } else {
                tracing::warn!("Config file {} not found, using defaults", path);
            }
        }

        // STREAMEDGE_CACHE__MEMORY_CAPACITY=120, STREAMEDGE_SERVER__HTTP_PORT=9000, ...
        builder = builder.add_source(
            Environment::with_prefix("STREAMEDGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    /// Check for values that would make the edge misbehave.
    /// Returns every problem found rather than stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.cache.memory_capacity == 0 {
            errors.push("cache.memory_capacity must be greater than 0".to_string());
        }
        if self.registry.heartbeat_interval_secs == 0 {
            errors.push("registry.heartbeat_interval_secs must be greater than 0".to_string());
        }
        if self.registry.ttl_multiplier < 3 {
            errors.push(format!(
                "registry.ttl_multiplier must be at least 3 (got {})",
                self.registry.ttl_multiplier
            ));
        }
        if self.origin.slow_threshold_ms == 0 {
            errors.push("origin.slow_threshold_ms must be greater than 0".to_string());
        }
        if self.origin.request_timeout_secs == 0 {
            errors.push("origin.request_timeout_secs must be greater than 0".to_string());
        }
        if self.slow_path.queue_capacity == 0 {
            errors.push("slow_path.queue_capacity must be greater than 0".to_string());
        }
        if self.slow_path.policy == SlowPathPolicyKind::Deregister
            && (self.slow_path.threshold == 0 || self.slow_path.window_secs == 0)
        {
            errors.push(
                "slow_path.threshold and slow_path.window_secs must be greater than 0 for the deregister policy"
                    .to_string(),
            );
        }
        if self.cache.disk_retention_secs == Some(0) {
            errors.push("cache.disk_retention_secs must be greater than 0 when set".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
