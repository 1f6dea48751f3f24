//! Shared data types for the storage layer

use serde::{Deserialize, Serialize};

// ============================================================================
// ISSUES (error groups)
// ============================================================================

/// Issue lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Open,
    Resolved,
    Ignored,
    Snoozed,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
            Self::Ignored => "ignored",
            Self::Snoozed => "snoozed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "resolved" => Some(Self::Resolved),
            "ignored" => Some(Self::Ignored),
            "snoozed" => Some(Self::Snoozed),
            _ => None,
        }
    }
}

/// Severity level of an occurrence or issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fatal" => Some(Self::Fatal),
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }
}

/// One deduplicated issue (error group)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRow {
    pub fingerprint: String,
    pub project_id: String,
    pub message: String,
    pub file: String,
    pub line: i64,
    pub url: Option<String>,
    pub status_code: Option<i64>,
    pub level: String,
    pub count: i64,
    pub users_affected: i64,
    pub first_seen: i64,
    pub last_seen: i64,
    pub status: IssueStatus,
    pub resolved_at: Option<i64>,
    pub resolved_by: Option<String>,
    pub assigned_to: Option<String>,
    pub snoozed_until: Option<i64>,
}

/// Result of the atomic issue upsert, consumed by alert evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// This occurrence created the group
    pub new_group: bool,
    /// The group was resolved and this occurrence reopened it
    pub regression: bool,
}

// ============================================================================
// OCCURRENCES (error events)
// ============================================================================

/// An occurrence ready for persistence (scrubbed)
#[derive(Debug, Clone)]
pub struct OccurrenceRecord {
    pub fingerprint: String,
    pub project_id: String,
    pub stack: String,
    pub url: Option<String>,
    pub env: String,
    pub status_code: Option<i64>,
    pub level: String,
    pub breadcrumbs: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub release: Option<String>,
    pub created_at: i64,
}

// ============================================================================
// FINGERPRINT RULES
// ============================================================================

/// Tenant-defined grouping override, matched against the raw message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintRule {
    pub pattern: String,
    pub group_key: String,
    pub priority: i64,
}

// ============================================================================
// ALERT RULES
// ============================================================================

/// Alert rule type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertRuleType {
    NewError,
    Threshold,
    Regression,
}

impl AlertRuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewError => "new_error",
            Self::Threshold => "threshold",
            Self::Regression => "regression",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new_error" => Some(Self::NewError),
            "threshold" => Some(Self::Threshold),
            "regression" => Some(Self::Regression),
            _ => None,
        }
    }
}

/// Notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertChannel {
    Email,
    Chat,
    Webhook,
}

impl AlertChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Chat => "chat",
            Self::Webhook => "webhook",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "chat" => Some(Self::Chat),
            "webhook" => Some(Self::Webhook),
            _ => None,
        }
    }
}

/// Channel-specific rule configuration, stored as JSON on the rule row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertRuleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_webhook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// One alert rule (managed externally, consumed here)
#[derive(Debug, Clone)]
pub struct AlertRuleRow {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub rule_type: AlertRuleType,
    pub threshold: Option<i64>,
    pub window_minutes: Option<i64>,
    pub channel: AlertChannel,
    pub config: AlertRuleConfig,
    pub enabled: bool,
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

/// Notification delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// Append-only notification audit record
#[derive(Debug, Clone)]
pub struct NotificationRecord {
    pub rule_id: String,
    pub project_id: String,
    pub fingerprint: String,
    pub channel: AlertChannel,
    pub status: NotificationStatus,
    pub error: Option<String>,
}

// ============================================================================
// PROJECTS
// ============================================================================

/// Tenant plan (drives quota and retention)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Team,
    Enterprise,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Team => "team",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Self::Free),
            "pro" => Some(Self::Pro),
            "team" => Some(Self::Team),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }
}

/// Project row (read-side collaborator, managed externally)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRow {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub plan: Plan,
    /// Ingestion kill switch
    pub events_enabled: bool,
    /// Server-side sample rate in [0.0, 1.0]
    pub sample_rate: f64,
}

// ============================================================================
// API KEYS
// ============================================================================

/// Validated API key lookup result (cached)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyValidation {
    pub key_id: String,
    pub project_id: String,
    pub last_used_at: Option<i64>,
}

// ============================================================================
// PERFORMANCE
// ============================================================================

/// Raw performance metric sample
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub project_id: String,
    pub metric_type: String,
    pub name: String,
    pub env: String,
    pub value: f64,
    pub timestamp: i64,
}

/// Raw transaction sample
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub project_id: String,
    pub name: String,
    pub op: String,
    pub env: String,
    pub duration_ms: f64,
    pub status: String,
    pub timestamp: i64,
}

/// Computed statistics for one rollup bucket
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BucketStats {
    pub count: i64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Apdex buckets for transaction rollups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApdexBuckets {
    pub satisfied: i64,
    pub tolerating: i64,
    pub frustrated: i64,
}
