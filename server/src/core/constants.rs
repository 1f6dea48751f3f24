// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display and platform directories)
pub const APP_NAME: &str = "ErrorWatch";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "errorwatch";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".errorwatch";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "ERRORWATCH_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "ERRORWATCH_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "ERRORWATCH_LOG";

/// Environment variable to override data directory
pub const ENV_DATA_DIR: &str = "ERRORWATCH_DATA_DIR";

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 5815;

// =============================================================================
// SQLite Database
// =============================================================================

/// SQLite database filename
pub const SQLITE_DB_FILENAME: &str = "errorwatch.db";

/// SQLite connection pool max connections
pub const SQLITE_MAX_CONNECTIONS: u32 = 10;

/// SQLite busy timeout in seconds
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 30;

/// SQLite cache size (negative = KB, so -64000 = 64MB)
pub const SQLITE_CACHE_SIZE: &str = "-64000";

/// SQLite WAL auto-checkpoint threshold (pages)
pub const SQLITE_WAL_AUTOCHECKPOINT: &str = "1000";

/// WAL checkpoint interval in seconds (5 minutes)
pub const SQLITE_CHECKPOINT_INTERVAL_SECS: u64 = 300;

// =============================================================================
// Cache
// =============================================================================

/// Environment variable for cache backend
pub const ENV_CACHE_BACKEND: &str = "ERRORWATCH_CACHE_BACKEND";

/// Environment variable for cache max entries
pub const ENV_CACHE_MAX_ENTRIES: &str = "ERRORWATCH_CACHE_MAX_ENTRIES";

/// Environment variable for Redis-compatible cache URL
pub const ENV_CACHE_REDIS_URL: &str = "ERRORWATCH_CACHE_REDIS_URL";

/// Default cache max entries
pub const DEFAULT_CACHE_MAX_ENTRIES: u64 = 100_000;

/// Cache key version (bump on schema changes to invalidate all cached data)
pub const CACHE_KEY_VERSION: &str = "v1";

/// Cache TTL for valid API key lookups (5 minutes)
pub const CACHE_TTL_API_KEY_VALID: u64 = 300;

/// Cache TTL for invalid/not-found API key lookups (30 seconds)
pub const CACHE_TTL_API_KEY_INVALID: u64 = 30;

/// Cache TTL for fingerprint rules per project (60 seconds)
pub const CACHE_TTL_FINGERPRINT_RULES: u64 = 60;

/// Cache TTL for project metadata and settings (5 minutes)
pub const CACHE_TTL_PROJECT: u64 = 300;

/// Cache TTL for aggregated stats views (15 minutes)
pub const CACHE_TTL_STATS: u64 = 900;

/// Debounce interval for updating API key last_used_at (5 minutes)
pub const API_KEY_TOUCH_DEBOUNCE_SECS: u64 = 300;

// =============================================================================
// API Keys
// =============================================================================

/// API key prefix for production keys
pub const API_KEY_PREFIX_LIVE: &str = "ew_live_";

/// API key prefix for test keys
pub const API_KEY_PREFIX_TEST: &str = "ew_test_";

/// Minimum length of the random portion of an API key
pub const API_KEY_RANDOM_MIN_LENGTH: usize = 32;

/// Environment variable for the API key hashing secret (hex-encoded)
pub const ENV_API_KEY_SECRET: &str = "ERRORWATCH_API_KEY_SECRET";

// =============================================================================
// Admin / Operator
// =============================================================================

/// Environment variable for the operator token guarding the admin surface
pub const ENV_ADMIN_TOKEN: &str = "ERRORWATCH_ADMIN_TOKEN";

// =============================================================================
// Ingestion Admission
// =============================================================================

/// Environment variable for the per-second soft ingest limit
pub const ENV_INGEST_SOFT_LIMIT: &str = "ERRORWATCH_INGEST_SOFT_LIMIT_PER_SEC";

/// Environment variable for the per-second hard ingest limit
pub const ENV_INGEST_HARD_LIMIT: &str = "ERRORWATCH_INGEST_HARD_LIMIT_PER_SEC";

/// Default per-second soft ingest limit (accept everything below this)
pub const DEFAULT_INGEST_SOFT_LIMIT: u32 = 120;

/// Default per-second hard ingest limit (drop everything at or above this)
pub const DEFAULT_INGEST_HARD_LIMIT: u32 = 220;

/// TTL for the per-second admission counters (seconds)
pub const INGEST_COUNTER_TTL_SECS: u64 = 3;

/// Maximum drop probability in the graduated sampling band
pub const INGEST_MAX_DROP_PROBABILITY: f64 = 0.9;

/// Short-window duplicate suppression TTL at admission (seconds)
pub const INGEST_DEDUP_TTL_SECS: u64 = 10;

// =============================================================================
// Rate Limiting (admin/dashboard surface)
// =============================================================================

/// Environment variable for rate limit enabled
pub const ENV_RATE_LIMIT_ENABLED: &str = "ERRORWATCH_RATE_LIMIT_ENABLED";

/// Environment variable for API rate limit (requests per minute)
pub const ENV_RATE_LIMIT_API_RPM: &str = "ERRORWATCH_RATE_LIMIT_API_RPM";

/// Default API rate limit (requests per minute)
pub const DEFAULT_RATE_LIMIT_API_RPM: u32 = 1000;

/// Rate limit window in seconds (fixed 1-minute window)
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

// =============================================================================
// Request Body Limits
// =============================================================================

/// Default body limit for general API requests (1 MB)
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Body limit for event ingestion (stack traces and breadcrumbs, 2 MB)
pub const EVENT_BODY_LIMIT: usize = 2 * 1024 * 1024;

// =============================================================================
// Job Queue
// =============================================================================

/// Environment variable for event worker concurrency
pub const ENV_EVENT_WORKER_CONCURRENCY: &str = "ERRORWATCH_EVENT_WORKER_CONCURRENCY";

/// Environment variable for alert worker concurrency
pub const ENV_ALERT_WORKER_CONCURRENCY: &str = "ERRORWATCH_ALERT_WORKER_CONCURRENCY";

/// Default event worker concurrency
pub const DEFAULT_EVENT_WORKER_CONCURRENCY: usize = 10;

/// Default alert worker concurrency
pub const DEFAULT_ALERT_WORKER_CONCURRENCY: usize = 5;

/// Aggregation worker concurrency (must not overlap with itself)
pub const AGGREGATION_WORKER_CONCURRENCY: usize = 1;

/// Worker poll interval when the queue is empty (milliseconds)
pub const QUEUE_POLL_INTERVAL_MS: u64 = 250;

/// Retention for completed jobs (seconds)
pub const QUEUE_COMPLETED_RETENTION_SECS: i64 = 3600;

/// Retention for parked (permanently failed) jobs (seconds)
pub const QUEUE_PARKED_RETENTION_SECS: i64 = 7 * 86_400;

/// Interval between queue maintenance sweeps (seconds)
pub const QUEUE_MAINTENANCE_INTERVAL_SECS: u64 = 600;

// =============================================================================
// Aggregation & Retention Schedule
// =============================================================================

/// UTC hour at which the hourly rollup job is enqueued
pub const SCHEDULE_HOURLY_ROLLUP_UTC_HOUR: u32 = 2;

/// UTC hour at which the daily rollup job is enqueued
pub const SCHEDULE_DAILY_ROLLUP_UTC_HOUR: u32 = 3;

/// UTC hour at which the retention cleanup job is enqueued
pub const SCHEDULE_CLEANUP_UTC_HOUR: u32 = 4;

/// Apdex satisfied threshold (milliseconds)
pub const APDEX_SATISFIED_MS: f64 = 500.0;

/// Apdex tolerating threshold (milliseconds)
pub const APDEX_TOLERATING_MS: f64 = 2000.0;

/// Default retention for raw performance data (days)
pub const DEFAULT_PERF_RETENTION_DAYS: i64 = 30;

/// Default retention for raw error events (days)
pub const DEFAULT_EVENT_RETENTION_DAYS: i64 = 30;

/// Default retention for notifications (days)
pub const DEFAULT_NOTIFICATION_RETENTION_DAYS: i64 = 90;

/// Default retention for hourly aggregates (days, ~12 months)
pub const DEFAULT_AGGREGATE_RETENTION_DAYS: i64 = 365;

// =============================================================================
// Alerts
// =============================================================================

/// Environment variable for the email API endpoint
pub const ENV_EMAIL_API_URL: &str = "ERRORWATCH_EMAIL_API_URL";

/// Environment variable for the email API key
pub const ENV_EMAIL_API_KEY: &str = "ERRORWATCH_EMAIL_API_KEY";

/// Environment variable for the dashboard base URL used in notification links
pub const ENV_DASHBOARD_URL: &str = "ERRORWATCH_DASHBOARD_URL";

/// Default dashboard base URL
pub const DEFAULT_DASHBOARD_URL: &str = "http://localhost:3001";

/// From address used for alert emails
pub const ALERT_EMAIL_FROM: &str = "ErrorWatch Alerts <alerts@errorwatch.dev>";

/// Timeout for outbound notification HTTP calls (seconds)
pub const NOTIFICATION_HTTP_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Fingerprinting
// =============================================================================

/// Maximum stack frames considered for the fingerprint
pub const FINGERPRINT_MAX_FRAMES: usize = 5;

/// Number of top frames included in the fingerprint signature
pub const FINGERPRINT_TOP_FRAMES: usize = 3;

// =============================================================================
// Realtime Topics
// =============================================================================

/// Topic name prefix for org-scoped issue event broadcasts
pub const TOPIC_ISSUE_EVENTS_PREFIX: &str = "events:org:";

/// Maximum SSE events per second per connection (backpressure)
pub const SSE_MAX_EVENTS_PER_SECOND: u32 = 20;

// =============================================================================
// Shutdown
// =============================================================================

/// Graceful shutdown timeout in seconds
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// Defaults (seeded on first run)
// =============================================================================

/// Default organization ID (created on first run)
pub const DEFAULT_ORG_ID: &str = "default";

/// Default project ID (created on first run)
pub const DEFAULT_PROJECT_ID: &str = "default";
