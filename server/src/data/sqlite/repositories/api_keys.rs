//! API key repository
//!
//! Lookups are by keyed hash, never by the raw key. Reads use positive and
//! negative caching; deletion invalidates both immediately so revoked keys
//! stop working without waiting for the TTL.

use std::time::Duration;

use sqlx::SqlitePool;

use crate::core::constants::{CACHE_TTL_API_KEY_INVALID, CACHE_TTL_API_KEY_VALID};
use crate::data::cache::{CacheKey, CacheService};
use crate::data::sqlite::SqliteError;
use crate::data::types::ApiKeyValidation;

/// Get API key validation info by hash (with optional caching)
pub async fn get_by_hash(
    pool: &SqlitePool,
    cache: Option<&CacheService>,
    key_hash: &str,
) -> Result<Option<ApiKeyValidation>, SqliteError> {
    if let Some(cache) = cache {
        let key = CacheKey::api_key_by_hash(key_hash);
        let neg_key = CacheKey::api_key_negative(key_hash);

        match cache.get::<ApiKeyValidation>(&key).await {
            Ok(Some(validation)) => {
                tracing::trace!("API key cache hit");
                return Ok(Some(validation));
            }
            Err(e) => tracing::warn!(error = %e, "Cache get error"),
            Ok(None) => {}
        }

        // Known not-found (short TTL so newly created keys work promptly)
        if cache.exists(&neg_key).await.unwrap_or(false) {
            tracing::trace!("API key negative cache hit");
            return Ok(None);
        }

        let result = get_by_hash_from_db(pool, key_hash).await?;

        match &result {
            Some(v) => {
                if let Err(e) = cache
                    .set(&key, v, Some(Duration::from_secs(CACHE_TTL_API_KEY_VALID)))
                    .await
                {
                    tracing::warn!(error = %e, "Cache set error");
                }
            }
            None => {
                if let Err(e) = cache
                    .set_raw(
                        &neg_key,
                        vec![],
                        Some(Duration::from_secs(CACHE_TTL_API_KEY_INVALID)),
                    )
                    .await
                {
                    tracing::warn!(error = %e, "Cache set (negative) error");
                }
            }
        }

        Ok(result)
    } else {
        get_by_hash_from_db(pool, key_hash).await
    }
}

async fn get_by_hash_from_db(
    pool: &SqlitePool,
    key_hash: &str,
) -> Result<Option<ApiKeyValidation>, SqliteError> {
    let row = sqlx::query_as::<_, (String, String, Option<i64>)>(
        "SELECT id, project_id, last_used_at FROM api_keys WHERE key_hash = ?",
    )
    .bind(key_hash)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(key_id, project_id, last_used_at)| ApiKeyValidation {
        key_id,
        project_id,
        last_used_at,
    }))
}

/// Insert an API key row (operator/test seeding; CRUD lives elsewhere)
pub async fn insert_api_key(
    pool: &SqlitePool,
    project_id: &str,
    name: &str,
    key_hash: &str,
    key_prefix: &str,
) -> Result<String, SqliteError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp_millis();

    sqlx::query(
        r#"INSERT INTO api_keys (id, project_id, name, key_hash, key_prefix, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(project_id)
    .bind(name)
    .bind(key_hash)
    .bind(key_prefix)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Delete an API key and invalidate its cache entries immediately
pub async fn delete_api_key(
    pool: &SqlitePool,
    cache: Option<&CacheService>,
    key_id: &str,
) -> Result<bool, SqliteError> {
    let key_hash: Option<(String,)> =
        sqlx::query_as("SELECT key_hash FROM api_keys WHERE id = ?")
            .bind(key_id)
            .fetch_optional(pool)
            .await?;

    let result = sqlx::query("DELETE FROM api_keys WHERE id = ?")
        .bind(key_id)
        .execute(pool)
        .await?;

    let deleted = result.rows_affected() > 0;

    if deleted
        && let (Some(cache), Some((hash,))) = (cache, key_hash)
    {
        cache.invalidate_key(&CacheKey::api_key_by_hash(&hash)).await;
        cache.invalidate_key(&CacheKey::api_key_negative(&hash)).await;
    }

    Ok(deleted)
}

/// Update last_used_at (debounced, only if older than threshold)
pub async fn touch_api_key(
    pool: &SqlitePool,
    key_id: &str,
    threshold_secs: u64,
) -> Result<bool, SqliteError> {
    let now = chrono::Utc::now().timestamp_millis();
    let threshold = now - (threshold_secs as i64) * 1000;

    let result = sqlx::query(
        "UPDATE api_keys SET last_used_at = ? WHERE id = ? AND (last_used_at < ? OR last_used_at IS NULL)",
    )
    .bind(now)
    .bind(key_id)
    .bind(threshold)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cache::test_cache;
    use crate::data::sqlite::test_pool;

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let pool = test_pool().await;
        insert_api_key(&pool, "default", "SDK Key", "hash123", "ew_live_abcd")
            .await
            .unwrap();

        let validation = get_by_hash(&pool, None, "hash123").await.unwrap().unwrap();
        assert_eq!(validation.project_id, "default");
        assert!(validation.last_used_at.is_none());

        assert!(get_by_hash(&pool, None, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_touch_is_debounced() {
        let pool = test_pool().await;
        let id = insert_api_key(&pool, "default", "SDK Key", "hash123", "ew_live_abcd")
            .await
            .unwrap();

        assert!(touch_api_key(&pool, &id, 300).await.unwrap());
        assert!(!touch_api_key(&pool, &id, 300).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_invalidates_cache() {
        let pool = test_pool().await;
        let cache = test_cache().await;
        let id = insert_api_key(&pool, "default", "SDK Key", "hash123", "ew_live_abcd")
            .await
            .unwrap();

        // Warm the positive cache
        let validation = get_by_hash(&pool, Some(&cache), "hash123").await.unwrap();
        assert!(validation.is_some());

        // Deletion must take effect immediately, not after the TTL
        assert!(delete_api_key(&pool, Some(&cache), &id).await.unwrap());
        let validation = get_by_hash(&pool, Some(&cache), "hash123").await.unwrap();
        assert!(validation.is_none());
    }

    #[tokio::test]
    async fn test_negative_cache_round_trip() {
        let pool = test_pool().await;
        let cache = test_cache().await;

        // First miss populates the negative cache, second read hits it
        assert!(
            get_by_hash(&pool, Some(&cache), "absent")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            get_by_hash(&pool, Some(&cache), "absent")
                .await
                .unwrap()
                .is_none()
        );
    }
}
