//! Application configuration
//!
//! Configuration is resolved in order of precedence:
//! 1. CLI arguments
//! 2. Environment variables
//! 3. Built-in defaults
//!
//! All environment variables are prefixed with `ERRORWATCH_`.

use anyhow::{Context, Result, bail};

use super::cli::CliConfig;
use super::constants::{
    DEFAULT_ALERT_WORKER_CONCURRENCY, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_DASHBOARD_URL,
    DEFAULT_EVENT_RETENTION_DAYS, DEFAULT_EVENT_WORKER_CONCURRENCY, DEFAULT_HOST,
    DEFAULT_INGEST_HARD_LIMIT, DEFAULT_INGEST_SOFT_LIMIT, DEFAULT_NOTIFICATION_RETENTION_DAYS,
    DEFAULT_PERF_RETENTION_DAYS, DEFAULT_PORT, DEFAULT_RATE_LIMIT_API_RPM, ENV_ADMIN_TOKEN,
    ENV_ALERT_WORKER_CONCURRENCY, ENV_API_KEY_SECRET, ENV_CACHE_BACKEND, ENV_CACHE_MAX_ENTRIES,
    ENV_CACHE_REDIS_URL, ENV_DASHBOARD_URL, ENV_EMAIL_API_KEY, ENV_EMAIL_API_URL,
    ENV_EVENT_WORKER_CONCURRENCY, ENV_HOST, ENV_INGEST_HARD_LIMIT, ENV_INGEST_SOFT_LIMIT,
    ENV_PORT, ENV_RATE_LIMIT_API_RPM, ENV_RATE_LIMIT_ENABLED,
};

/// Cache backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendType {
    /// In-process cache (single-node deployments)
    Memory,
    /// Redis-compatible cache (multi-process deployments share one admission point)
    Redis,
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackendType,
    pub max_entries: u64,
    pub redis_url: Option<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Admission-side ingestion limits
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Per-project-per-second soft limit (below: accept unconditionally)
    pub soft_limit_per_sec: u32,
    /// Per-project-per-second hard limit (at/above: drop unconditionally)
    pub hard_limit_per_sec: u32,
}

/// Fixed-window rate limiting for the dashboard/admin surface
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub api_rpm: u32,
}

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub event_concurrency: usize,
    pub alert_concurrency: usize,
}

/// Outbound notification configuration
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Email API endpoint; when unset, email dispatch is skipped with a warning
    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,
    /// Base URL used for links in notification payloads
    pub dashboard_url: String,
}

/// Retention windows for raw and derived data
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub event_retention_days: i64,
    pub perf_retention_days: i64,
    pub notification_retention_days: i64,
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub ingest: IngestConfig,
    pub rate_limit: RateLimitConfig,
    pub queue: QueueConfig,
    pub alerts: AlertConfig,
    pub retention: RetentionConfig,
    /// Secret used to hash API keys before storage/lookup (hex-encoded)
    pub api_key_secret: Vec<u8>,
    /// Operator token guarding the admin surface; admin routes 404 when unset
    pub admin_token: Option<String>,
}

impl AppConfig {
    /// Load configuration from CLI arguments and environment variables
    pub fn load(cli: &CliConfig) -> Result<Self> {
        let host = cli
            .host
            .clone()
            .or_else(|| std::env::var(ENV_HOST).ok())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = cli
            .port
            .or_else(|| env_parse(ENV_PORT))
            .unwrap_or(DEFAULT_PORT);

        let cache_backend = match cli
            .cache_backend
            .or_else(|| match std::env::var(ENV_CACHE_BACKEND).ok().as_deref() {
                Some("redis") => Some(CacheBackendType::Redis),
                Some("memory") => Some(CacheBackendType::Memory),
                _ => None,
            }) {
            Some(backend) => backend,
            None => CacheBackendType::Memory,
        };

        let cache = CacheConfig {
            backend: cache_backend,
            max_entries: env_parse(ENV_CACHE_MAX_ENTRIES).unwrap_or(DEFAULT_CACHE_MAX_ENTRIES),
            redis_url: cli
                .cache_redis_url
                .clone()
                .or_else(|| std::env::var(ENV_CACHE_REDIS_URL).ok()),
        };

        if cache.backend == CacheBackendType::Redis && cache.redis_url.is_none() {
            bail!("cache backend is 'redis' but {} is not set", ENV_CACHE_REDIS_URL);
        }

        let soft_limit = cli
            .ingest_soft_limit
            .or_else(|| env_parse(ENV_INGEST_SOFT_LIMIT))
            .unwrap_or(DEFAULT_INGEST_SOFT_LIMIT);
        let hard_limit = cli
            .ingest_hard_limit
            .or_else(|| env_parse(ENV_INGEST_HARD_LIMIT))
            .unwrap_or(DEFAULT_INGEST_HARD_LIMIT);
        if hard_limit <= soft_limit {
            bail!(
                "ingest hard limit ({}) must be greater than soft limit ({})",
                hard_limit,
                soft_limit
            );
        }

        let api_key_secret = match std::env::var(ENV_API_KEY_SECRET) {
            Ok(hex_secret) => hex::decode(hex_secret.trim())
                .with_context(|| format!("{} must be hex-encoded", ENV_API_KEY_SECRET))?,
            // Keys hashed with the default secret are only valid for local use
            Err(_) => b"errorwatch-local-dev".to_vec(),
        };

        Ok(Self {
            server: ServerConfig { host, port },
            cache,
            ingest: IngestConfig {
                soft_limit_per_sec: soft_limit,
                hard_limit_per_sec: hard_limit,
            },
            rate_limit: RateLimitConfig {
                enabled: env_parse::<String>(ENV_RATE_LIMIT_ENABLED)
                    .map(|v| v != "false" && v != "0")
                    .unwrap_or(true),
                api_rpm: env_parse(ENV_RATE_LIMIT_API_RPM).unwrap_or(DEFAULT_RATE_LIMIT_API_RPM),
            },
            queue: QueueConfig {
                event_concurrency: env_parse(ENV_EVENT_WORKER_CONCURRENCY)
                    .unwrap_or(DEFAULT_EVENT_WORKER_CONCURRENCY),
                alert_concurrency: env_parse(ENV_ALERT_WORKER_CONCURRENCY)
                    .unwrap_or(DEFAULT_ALERT_WORKER_CONCURRENCY),
            },
            alerts: AlertConfig {
                email_api_url: std::env::var(ENV_EMAIL_API_URL).ok(),
                email_api_key: std::env::var(ENV_EMAIL_API_KEY).ok(),
                dashboard_url: std::env::var(ENV_DASHBOARD_URL)
                    .unwrap_or_else(|_| DEFAULT_DASHBOARD_URL.to_string()),
            },
            retention: RetentionConfig {
                event_retention_days: DEFAULT_EVENT_RETENTION_DAYS,
                perf_retention_days: DEFAULT_PERF_RETENTION_DAYS,
                notification_retention_days: DEFAULT_NOTIFICATION_RETENTION_DAYS,
            },
            api_key_secret,
            admin_token: std::env::var(ENV_ADMIN_TOKEN).ok().filter(|t| !t.is_empty()),
        })
    }
}

/// Parse an environment variable into T, None when unset or unparsable
fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_cli() -> CliConfig {
        CliConfig::default()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::load(&empty_cli()).unwrap();
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.cache.backend, CacheBackendType::Memory);
        assert_eq!(config.ingest.soft_limit_per_sec, DEFAULT_INGEST_SOFT_LIMIT);
        assert_eq!(config.ingest.hard_limit_per_sec, DEFAULT_INGEST_HARD_LIMIT);
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_cli_overrides_env() {
        let cli = CliConfig {
            host: Some("0.0.0.0".to_string()),
            port: Some(9000),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_redis_backend_requires_url() {
        let cli = CliConfig {
            cache_backend: Some(CacheBackendType::Redis),
            ..Default::default()
        };
        assert!(AppConfig::load(&cli).is_err());

        let cli = CliConfig {
            cache_backend: Some(CacheBackendType::Redis),
            cache_redis_url: Some("redis://127.0.0.1:6379/0".to_string()),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.cache.backend, CacheBackendType::Redis);
    }
}
