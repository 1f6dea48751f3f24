//! Project repository
//!
//! Projects are managed by the external management layer; this repository is
//! the read path used during admission plus the seeding helpers for tests and
//! operator tooling. Cached reads tolerate up to CACHE_TTL_PROJECT seconds of
//! staleness except for the ingestion kill switch, which is invalidated on
//! write by the management layer.

use std::time::Duration;

use sqlx::SqlitePool;

use crate::core::constants::CACHE_TTL_PROJECT;
use crate::data::cache::{CacheKey, CacheService};
use crate::data::sqlite::SqliteError;
use crate::data::types::{Plan, ProjectRow};

/// Get a project by ID (with optional caching)
pub async fn get_project(
    pool: &SqlitePool,
    cache: Option<&CacheService>,
    project_id: &str,
) -> Result<Option<ProjectRow>, SqliteError> {
    if let Some(cache) = cache {
        let key = CacheKey::project(project_id);

        match cache.get::<ProjectRow>(&key).await {
            Ok(Some(project)) => {
                tracing::trace!(project_id, "Project cache hit");
                return Ok(Some(project));
            }
            Err(e) => tracing::warn!(project_id, error = %e, "Cache get error"),
            Ok(None) => {}
        }

        let result = get_project_from_db(pool, project_id).await?;

        if let Some(project) = &result
            && let Err(e) = cache
                .set(&key, project, Some(Duration::from_secs(CACHE_TTL_PROJECT)))
                .await
        {
            tracing::warn!(project_id, error = %e, "Cache set error");
        }

        Ok(result)
    } else {
        get_project_from_db(pool, project_id).await
    }
}

async fn get_project_from_db(
    pool: &SqlitePool,
    project_id: &str,
) -> Result<Option<ProjectRow>, SqliteError> {
    let row = sqlx::query_as::<_, (String, String, String, String, i64, f64)>(
        r#"SELECT id, organization_id, name, plan, events_enabled, sample_rate
           FROM projects WHERE id = ?"#,
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(
        |(id, organization_id, name, plan, events_enabled, sample_rate)| ProjectRow {
            id,
            organization_id,
            name,
            plan: Plan::parse(&plan).unwrap_or(Plan::Free),
            events_enabled: events_enabled != 0,
            sample_rate,
        },
    ))
}

/// Invalidate the cached entry for a project (call after management writes)
pub async fn invalidate_project_cache(cache: &CacheService, project_id: &str) {
    cache.invalidate_key(&CacheKey::project(project_id)).await;
}

/// Insert a project row (operator/test seeding; CRUD lives elsewhere)
pub async fn insert_project(
    pool: &SqlitePool,
    project_id: &str,
    organization_id: &str,
    name: &str,
    plan: Plan,
) -> Result<(), SqliteError> {
    let now = chrono::Utc::now().timestamp_millis();
    sqlx::query(
        r#"INSERT INTO projects (id, organization_id, name, plan, events_enabled, sample_rate, created_at, updated_at)
           VALUES (?, ?, ?, ?, 1, 1.0, ?, ?)"#,
    )
    .bind(project_id)
    .bind(organization_id)
    .bind(name)
    .bind(plan.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Update ingestion settings (used by tests and the admin surface)
pub async fn set_project_settings(
    pool: &SqlitePool,
    cache: Option<&CacheService>,
    project_id: &str,
    events_enabled: bool,
    sample_rate: f64,
) -> Result<bool, SqliteError> {
    let now = chrono::Utc::now().timestamp_millis();
    let result = sqlx::query(
        "UPDATE projects SET events_enabled = ?, sample_rate = ?, updated_at = ? WHERE id = ?",
    )
    .bind(events_enabled as i64)
    .bind(sample_rate)
    .bind(now)
    .bind(project_id)
    .execute(pool)
    .await?;

    if let Some(cache) = cache {
        invalidate_project_cache(cache, project_id).await;
    }

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::test_pool;

    #[tokio::test]
    async fn test_default_project_is_seeded() {
        let pool = test_pool().await;
        let project = get_project(&pool, None, "default").await.unwrap().unwrap();
        assert_eq!(project.organization_id, "default");
        assert_eq!(project.plan, Plan::Free);
        assert!(project.events_enabled);
        assert_eq!(project.sample_rate, 1.0);
    }

    #[tokio::test]
    async fn test_get_missing_project() {
        let pool = test_pool().await;
        assert!(get_project(&pool, None, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_project_settings() {
        let pool = test_pool().await;
        let updated = set_project_settings(&pool, None, "default", false, 0.25)
            .await
            .unwrap();
        assert!(updated);

        let project = get_project(&pool, None, "default").await.unwrap().unwrap();
        assert!(!project.events_enabled);
        assert_eq!(project.sample_rate, 0.25);
    }

    #[tokio::test]
    async fn test_insert_project() {
        let pool = test_pool().await;
        insert_project(&pool, "p1", "org1", "Checkout", Plan::Pro)
            .await
            .unwrap();
        let project = get_project(&pool, None, "p1").await.unwrap().unwrap();
        assert_eq!(project.plan, Plan::Pro);
    }
}
