//! SQLite schema definitions
//!
//! Initial schema with all tables. Timestamps are unix epoch milliseconds.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema SQL
pub const SCHEMA: &str = r#"
-- =============================================================================
-- Infrastructure: Schema version tracking
-- =============================================================================
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at INTEGER NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at INTEGER NOT NULL,
    checksum TEXT NOT NULL,
    execution_time_ms INTEGER,
    success INTEGER NOT NULL DEFAULT 1
);

-- =============================================================================
-- 1. Projects (read-side collaborator; CRUD lives in the management layer)
-- =============================================================================
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    name TEXT NOT NULL CHECK(length(name) >= 1 AND length(name) <= 100),
    plan TEXT NOT NULL DEFAULT 'free' CHECK(plan IN ('free', 'pro', 'team', 'enterprise')),
    events_enabled INTEGER NOT NULL DEFAULT 1,
    sample_rate REAL NOT NULL DEFAULT 1.0 CHECK(sample_rate >= 0.0 AND sample_rate <= 1.0),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_projects_org ON projects(organization_id);

-- =============================================================================
-- 2. API Keys (references projects)
-- =============================================================================
CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK(length(name) >= 1 AND length(name) <= 100),
    key_hash TEXT NOT NULL UNIQUE,
    key_prefix TEXT NOT NULL,
    last_used_at INTEGER,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_api_keys_hash ON api_keys(key_hash);
CREATE INDEX IF NOT EXISTS idx_api_keys_project ON api_keys(project_id);

-- =============================================================================
-- 3. Fingerprint Rules (grouping overrides, highest priority wins)
-- =============================================================================
CREATE TABLE IF NOT EXISTS fingerprint_rules (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    pattern TEXT NOT NULL,
    group_key TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fingerprint_rules_project
    ON fingerprint_rules(project_id, priority DESC);

-- =============================================================================
-- 4. Issues (error groups, one row per fingerprint)
-- =============================================================================
CREATE TABLE IF NOT EXISTS error_groups (
    fingerprint TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    message TEXT NOT NULL,
    file TEXT NOT NULL,
    line INTEGER NOT NULL,
    url TEXT,
    status_code INTEGER,
    level TEXT NOT NULL DEFAULT 'error' CHECK(level IN ('fatal', 'error', 'warning', 'info', 'debug')),
    count INTEGER NOT NULL DEFAULT 1,
    users_affected INTEGER NOT NULL DEFAULT 0,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'open' CHECK(status IN ('open', 'resolved', 'ignored', 'snoozed')),
    resolved_at INTEGER,
    resolved_by TEXT,
    assigned_to TEXT,
    snoozed_until INTEGER
);

CREATE INDEX IF NOT EXISTS idx_error_groups_project_last_seen
    ON error_groups(project_id, last_seen DESC);
CREATE INDEX IF NOT EXISTS idx_error_groups_status ON error_groups(project_id, status);

-- =============================================================================
-- 5. Occurrences (error events, immutable)
-- =============================================================================
CREATE TABLE IF NOT EXISTS error_events (
    id TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL REFERENCES error_groups(fingerprint) ON DELETE CASCADE,
    project_id TEXT NOT NULL,
    stack TEXT NOT NULL,
    url TEXT,
    env TEXT NOT NULL,
    status_code INTEGER,
    level TEXT NOT NULL DEFAULT 'error',
    breadcrumbs TEXT,
    session_id TEXT,
    user_id TEXT,
    release TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_error_events_project_created
    ON error_events(project_id, created_at);
CREATE INDEX IF NOT EXISTS idx_error_events_fingerprint ON error_events(fingerprint);
CREATE INDEX IF NOT EXISTS idx_error_events_user ON error_events(fingerprint, user_id);
-- Idempotency backstop: re-delivered jobs must not insert the same occurrence twice
CREATE UNIQUE INDEX IF NOT EXISTS idx_error_events_dedup
    ON error_events(fingerprint, project_id, created_at);

-- =============================================================================
-- 6. Alert Rules (managed externally, consumed here)
-- =============================================================================
CREATE TABLE IF NOT EXISTS alert_rules (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    type TEXT NOT NULL CHECK(type IN ('new_error', 'threshold', 'regression')),
    threshold INTEGER,
    window_minutes INTEGER,
    channel TEXT NOT NULL CHECK(channel IN ('email', 'chat', 'webhook')),
    config TEXT NOT NULL DEFAULT '{}',
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_alert_rules_project ON alert_rules(project_id, enabled);

-- =============================================================================
-- 7. Notifications (append-only audit + cool-down signal)
-- =============================================================================
CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    rule_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    channel TEXT NOT NULL,
    status TEXT NOT NULL CHECK(status IN ('sent', 'failed')),
    error TEXT,
    sent_at INTEGER,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_rule_created
    ON notifications(rule_id, created_at);
CREATE INDEX IF NOT EXISTS idx_notifications_project ON notifications(project_id, created_at);

-- =============================================================================
-- 8. Raw performance data (aggregation source, retention-bounded)
-- =============================================================================
CREATE TABLE IF NOT EXISTS performance_metrics (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    type TEXT NOT NULL,
    name TEXT NOT NULL,
    env TEXT NOT NULL,
    value REAL NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_performance_metrics_ts ON performance_metrics(timestamp);
CREATE INDEX IF NOT EXISTS idx_performance_metrics_group
    ON performance_metrics(project_id, type, name, env, timestamp);

CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    name TEXT NOT NULL,
    op TEXT NOT NULL,
    env TEXT NOT NULL,
    duration REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'ok',
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_ts ON transactions(timestamp);
CREATE INDEX IF NOT EXISTS idx_transactions_group
    ON transactions(project_id, name, op, env, timestamp);

-- =============================================================================
-- 9. Rollup buckets (idempotent upserts keyed by grouping + bucket)
-- =============================================================================
CREATE TABLE IF NOT EXISTS metric_rollups_hourly (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    type TEXT NOT NULL,
    name TEXT NOT NULL,
    env TEXT NOT NULL,
    bucket_start INTEGER NOT NULL,
    count INTEGER NOT NULL,
    sum REAL NOT NULL,
    min REAL NOT NULL,
    max REAL NOT NULL,
    p50 REAL NOT NULL,
    p75 REAL NOT NULL,
    p90 REAL NOT NULL,
    p95 REAL NOT NULL,
    p99 REAL NOT NULL,
    UNIQUE(project_id, type, name, env, bucket_start)
);

CREATE TABLE IF NOT EXISTS metric_rollups_daily (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    type TEXT NOT NULL,
    name TEXT NOT NULL,
    env TEXT NOT NULL,
    bucket_start INTEGER NOT NULL,
    count INTEGER NOT NULL,
    sum REAL NOT NULL,
    min REAL NOT NULL,
    max REAL NOT NULL,
    p50 REAL NOT NULL,
    p75 REAL NOT NULL,
    p90 REAL NOT NULL,
    p95 REAL NOT NULL,
    p99 REAL NOT NULL,
    UNIQUE(project_id, type, name, env, bucket_start)
);

CREATE TABLE IF NOT EXISTS transaction_rollups_hourly (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    name TEXT NOT NULL,
    op TEXT NOT NULL,
    env TEXT NOT NULL,
    bucket_start INTEGER NOT NULL,
    count INTEGER NOT NULL,
    error_count INTEGER NOT NULL,
    duration_sum REAL NOT NULL,
    duration_min REAL NOT NULL,
    duration_max REAL NOT NULL,
    duration_p50 REAL NOT NULL,
    duration_p75 REAL NOT NULL,
    duration_p90 REAL NOT NULL,
    duration_p95 REAL NOT NULL,
    duration_p99 REAL NOT NULL,
    apdex_satisfied INTEGER NOT NULL,
    apdex_tolerating INTEGER NOT NULL,
    apdex_frustrated INTEGER NOT NULL,
    UNIQUE(project_id, name, op, env, bucket_start)
);

CREATE TABLE IF NOT EXISTS transaction_rollups_daily (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    name TEXT NOT NULL,
    op TEXT NOT NULL,
    env TEXT NOT NULL,
    bucket_start INTEGER NOT NULL,
    count INTEGER NOT NULL,
    error_count INTEGER NOT NULL,
    duration_sum REAL NOT NULL,
    duration_min REAL NOT NULL,
    duration_max REAL NOT NULL,
    duration_p50 REAL NOT NULL,
    duration_p75 REAL NOT NULL,
    duration_p90 REAL NOT NULL,
    duration_p95 REAL NOT NULL,
    duration_p99 REAL NOT NULL,
    apdex_satisfied INTEGER NOT NULL,
    apdex_tolerating INTEGER NOT NULL,
    apdex_frustrated INTEGER NOT NULL,
    UNIQUE(project_id, name, op, env, bucket_start)
);

-- =============================================================================
-- 10. Job queue (durable, per-class, shared across ingest processes)
-- =============================================================================
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    queue TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK(status IN ('pending', 'running', 'completed', 'parked')),
    attempts INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL,
    run_at INTEGER NOT NULL,
    last_error TEXT,
    dedup_key TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs(queue, status, run_at);
CREATE INDEX IF NOT EXISTS idx_jobs_status_updated ON jobs(status, updated_at);
-- One live job per dedup key (scheduler restarts must not double-enqueue)
CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_dedup
    ON jobs(dedup_key) WHERE dedup_key IS NOT NULL AND status IN ('pending', 'running');

-- =============================================================================
-- Default Data
-- =============================================================================

INSERT OR IGNORE INTO projects (id, organization_id, name, plan, events_enabled, sample_rate, created_at, updated_at)
VALUES ('default', 'default', 'Default Project', 'free', 1, 1.0,
        CAST(strftime('%s', 'now') AS INTEGER) * 1000,
        CAST(strftime('%s', 'now') AS INTEGER) * 1000);
"#;
