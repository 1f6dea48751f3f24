//! Fingerprint and alert rule repositories (read-mostly)
//!
//! Rule CRUD lives in the management layer; the pipeline only reads enabled
//! rules. Fingerprint rules run on every occurrence, so reads go through a
//! short-TTL per-project cache. Alert rules are read once per alert job and
//! hit the database directly.

use std::time::Duration;

use sqlx::SqlitePool;

use crate::core::constants::CACHE_TTL_FINGERPRINT_RULES;
use crate::data::cache::{CacheKey, CacheService};
use crate::data::sqlite::SqliteError;
use crate::data::types::{
    AlertChannel, AlertRuleConfig, AlertRuleRow, AlertRuleType, FingerprintRule,
};

/// Enabled fingerprint rules for a project, highest priority first.
///
/// Cached per project; rule changes may take up to the TTL to be observed by
/// warm ingest processes (accepted staleness window).
pub async fn fingerprint_rules_for_project(
    pool: &SqlitePool,
    cache: Option<&CacheService>,
    project_id: &str,
) -> Result<Vec<FingerprintRule>, SqliteError> {
    if let Some(cache) = cache {
        let key = CacheKey::fingerprint_rules(project_id);

        match cache.get::<Vec<FingerprintRule>>(&key).await {
            Ok(Some(rules)) => {
                tracing::trace!(project_id, "Fingerprint rules cache hit");
                return Ok(rules);
            }
            Err(e) => tracing::warn!(project_id, error = %e, "Cache get error"),
            Ok(None) => {}
        }

        let rules = fingerprint_rules_from_db(pool, project_id).await?;

        if let Err(e) = cache
            .set(
                &key,
                &rules,
                Some(Duration::from_secs(CACHE_TTL_FINGERPRINT_RULES)),
            )
            .await
        {
            tracing::warn!(project_id, error = %e, "Cache set error");
        }

        Ok(rules)
    } else {
        fingerprint_rules_from_db(pool, project_id).await
    }
}

async fn fingerprint_rules_from_db(
    pool: &SqlitePool,
    project_id: &str,
) -> Result<Vec<FingerprintRule>, SqliteError> {
    let rows = sqlx::query_as::<_, (String, String, i64)>(
        r#"SELECT pattern, group_key, priority FROM fingerprint_rules
           WHERE project_id = ? AND enabled = 1
           ORDER BY priority DESC"#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(pattern, group_key, priority)| FingerprintRule {
            pattern,
            group_key,
            priority,
        })
        .collect())
}

/// Insert a fingerprint rule (operator/test seeding; CRUD lives elsewhere)
pub async fn insert_fingerprint_rule(
    pool: &SqlitePool,
    cache: Option<&CacheService>,
    project_id: &str,
    pattern: &str,
    group_key: &str,
    priority: i64,
) -> Result<String, SqliteError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp_millis();

    sqlx::query(
        r#"INSERT INTO fingerprint_rules (id, project_id, pattern, group_key, priority, enabled, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&id)
    .bind(project_id)
    .bind(pattern)
    .bind(group_key)
    .bind(priority)
    .bind(now)
    .execute(pool)
    .await?;

    if let Some(cache) = cache {
        cache
            .invalidate_key(&CacheKey::fingerprint_rules(project_id))
            .await;
    }

    Ok(id)
}

/// Enabled alert rules for a project
pub async fn alert_rules_for_project(
    pool: &SqlitePool,
    project_id: &str,
) -> Result<Vec<AlertRuleRow>, SqliteError> {
    let rows = sqlx::query_as::<
        _,
        (
            String,
            String,
            String,
            String,
            Option<i64>,
            Option<i64>,
            String,
            String,
        ),
    >(
        r#"SELECT id, project_id, name, type, threshold, window_minutes, channel, config
           FROM alert_rules WHERE project_id = ? AND enabled = 1"#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    let mut rules = Vec::with_capacity(rows.len());
    for (id, project_id, name, rule_type, threshold, window_minutes, channel, config) in rows {
        let Some(rule_type) = AlertRuleType::parse(&rule_type) else {
            tracing::warn!(rule_id = %id, rule_type, "Skipping alert rule with unknown type");
            continue;
        };
        let Some(channel) = AlertChannel::parse(&channel) else {
            tracing::warn!(rule_id = %id, channel, "Skipping alert rule with unknown channel");
            continue;
        };
        let config: AlertRuleConfig = serde_json::from_str(&config).unwrap_or_else(|e| {
            tracing::warn!(rule_id = %id, error = %e, "Malformed alert rule config, using empty");
            AlertRuleConfig::default()
        });

        rules.push(AlertRuleRow {
            id,
            project_id,
            name,
            rule_type,
            threshold,
            window_minutes,
            channel,
            config,
            enabled: true,
        });
    }

    Ok(rules)
}

/// Insert an alert rule (operator/test seeding; CRUD lives elsewhere)
#[allow(clippy::too_many_arguments)]
pub async fn insert_alert_rule(
    pool: &SqlitePool,
    project_id: &str,
    name: &str,
    rule_type: AlertRuleType,
    threshold: Option<i64>,
    window_minutes: Option<i64>,
    channel: AlertChannel,
    config: &AlertRuleConfig,
) -> Result<String, SqliteError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp_millis();
    let config_json = serde_json::to_string(config)
        .map_err(|e| SqliteError::Conflict(format!("unserializable rule config: {}", e)))?;

    sqlx::query(
        r#"INSERT INTO alert_rules
               (id, project_id, name, type, threshold, window_minutes, channel, config, enabled, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)"#,
    )
    .bind(&id)
    .bind(project_id)
    .bind(name)
    .bind(rule_type.as_str())
    .bind(threshold)
    .bind(window_minutes)
    .bind(channel.as_str())
    .bind(&config_json)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}
