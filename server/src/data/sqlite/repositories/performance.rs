//! Performance data repository
//!
//! Raw metric/transaction samples are the aggregation source and are bounded
//! by retention. Rollup buckets are upserted on their UNIQUE grouping key so
//! re-running aggregation for a bucket overwrites instead of double-counting.

use sqlx::SqlitePool;

use crate::data::sqlite::SqliteError;
use crate::data::types::{ApdexBuckets, BucketStats, MetricRecord, TransactionRecord};

// ============================================================================
// Raw sample writes
// ============================================================================

pub async fn insert_metric(pool: &SqlitePool, record: &MetricRecord) -> Result<(), SqliteError> {
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO performance_metrics (id, project_id, type, name, env, value, timestamp)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&record.project_id)
    .bind(&record.metric_type)
    .bind(&record.name)
    .bind(&record.env)
    .bind(record.value)
    .bind(record.timestamp)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_transaction(
    pool: &SqlitePool,
    record: &TransactionRecord,
) -> Result<(), SqliteError> {
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO transactions (id, project_id, name, op, env, duration, status, timestamp)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&record.project_id)
    .bind(&record.name)
    .bind(&record.op)
    .bind(&record.env)
    .bind(record.duration_ms)
    .bind(&record.status)
    .bind(record.timestamp)
    .execute(pool)
    .await?;
    Ok(())
}

// ============================================================================
// Aggregation reads (values fetched per group, percentiles computed in Rust)
// ============================================================================

/// Metric values in [start, end) grouped by (project, type, name, env)
pub async fn metric_values_in_range(
    pool: &SqlitePool,
    start: i64,
    end: i64,
) -> Result<Vec<((String, String, String, String), Vec<f64>)>, SqliteError> {
    let rows = sqlx::query_as::<_, (String, String, String, String, f64)>(
        r#"SELECT project_id, type, name, env, value FROM performance_metrics
           WHERE timestamp >= ? AND timestamp < ?
           ORDER BY project_id, type, name, env"#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(group_values(rows.into_iter().map(
        |(project_id, metric_type, name, env, value)| {
            ((project_id, metric_type, name, env), value)
        },
    )))
}

/// Transaction (duration, is_error) samples in [start, end) grouped by
/// (project, name, op, env)
pub async fn transaction_values_in_range(
    pool: &SqlitePool,
    start: i64,
    end: i64,
) -> Result<Vec<((String, String, String, String), Vec<(f64, bool)>)>, SqliteError> {
    let rows = sqlx::query_as::<_, (String, String, String, String, f64, String)>(
        r#"SELECT project_id, name, op, env, duration, status FROM transactions
           WHERE timestamp >= ? AND timestamp < ?
           ORDER BY project_id, name, op, env"#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(group_values(rows.into_iter().map(
        |(project_id, name, op, env, duration, status)| {
            ((project_id, name, op, env), (duration, status == "error"))
        },
    )))
}

/// Collect pre-sorted (key, value) pairs into per-key vectors
fn group_values<K: PartialEq, V>(rows: impl Iterator<Item = (K, V)>) -> Vec<(K, Vec<V>)> {
    let mut groups: Vec<(K, Vec<V>)> = Vec::new();
    for (key, value) in rows {
        match groups.last_mut() {
            Some((last_key, values)) if *last_key == key => values.push(value),
            _ => groups.push((key, vec![value])),
        }
    }
    groups
}

// ============================================================================
// Rollup bucket upserts
// ============================================================================

/// Upsert one metric rollup bucket (hourly or daily table)
pub async fn upsert_metric_rollup(
    pool: &SqlitePool,
    table: RollupGranularity,
    key: &(String, String, String, String),
    bucket_start: i64,
    stats: &BucketStats,
) -> Result<(), SqliteError> {
    let id = uuid::Uuid::new_v4().to_string();
    let table = match table {
        RollupGranularity::Hourly => "metric_rollups_hourly",
        RollupGranularity::Daily => "metric_rollups_daily",
    };

    let sql = format!(
        r#"INSERT INTO {table}
               (id, project_id, type, name, env, bucket_start,
                count, sum, min, max, p50, p75, p90, p95, p99)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(project_id, type, name, env, bucket_start) DO UPDATE SET
               count = excluded.count,
               sum = excluded.sum,
               min = excluded.min,
               max = excluded.max,
               p50 = excluded.p50,
               p75 = excluded.p75,
               p90 = excluded.p90,
               p95 = excluded.p95,
               p99 = excluded.p99"#
    );

    sqlx::query(&sql)
        .bind(&id)
        .bind(&key.0)
        .bind(&key.1)
        .bind(&key.2)
        .bind(&key.3)
        .bind(bucket_start)
        .bind(stats.count)
        .bind(stats.sum)
        .bind(stats.min)
        .bind(stats.max)
        .bind(stats.p50)
        .bind(stats.p75)
        .bind(stats.p90)
        .bind(stats.p95)
        .bind(stats.p99)
        .execute(pool)
        .await?;
    Ok(())
}

/// Upsert one transaction rollup bucket (hourly or daily table)
#[allow(clippy::too_many_arguments)]
pub async fn upsert_transaction_rollup(
    pool: &SqlitePool,
    table: RollupGranularity,
    key: &(String, String, String, String),
    bucket_start: i64,
    stats: &BucketStats,
    error_count: i64,
    apdex: &ApdexBuckets,
) -> Result<(), SqliteError> {
    let id = uuid::Uuid::new_v4().to_string();
    let table = match table {
        RollupGranularity::Hourly => "transaction_rollups_hourly",
        RollupGranularity::Daily => "transaction_rollups_daily",
    };

    let sql = format!(
        r#"INSERT INTO {table}
               (id, project_id, name, op, env, bucket_start,
                count, error_count, duration_sum, duration_min, duration_max,
                duration_p50, duration_p75, duration_p90, duration_p95, duration_p99,
                apdex_satisfied, apdex_tolerating, apdex_frustrated)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(project_id, name, op, env, bucket_start) DO UPDATE SET
               count = excluded.count,
               error_count = excluded.error_count,
               duration_sum = excluded.duration_sum,
               duration_min = excluded.duration_min,
               duration_max = excluded.duration_max,
               duration_p50 = excluded.duration_p50,
               duration_p75 = excluded.duration_p75,
               duration_p90 = excluded.duration_p90,
               duration_p95 = excluded.duration_p95,
               duration_p99 = excluded.duration_p99,
               apdex_satisfied = excluded.apdex_satisfied,
               apdex_tolerating = excluded.apdex_tolerating,
               apdex_frustrated = excluded.apdex_frustrated"#
    );

    sqlx::query(&sql)
        .bind(&id)
        .bind(&key.0)
        .bind(&key.1)
        .bind(&key.2)
        .bind(&key.3)
        .bind(bucket_start)
        .bind(stats.count)
        .bind(error_count)
        .bind(stats.sum)
        .bind(stats.min)
        .bind(stats.max)
        .bind(stats.p50)
        .bind(stats.p75)
        .bind(stats.p90)
        .bind(stats.p95)
        .bind(stats.p99)
        .bind(apdex.satisfied)
        .bind(apdex.tolerating)
        .bind(apdex.frustrated)
        .execute(pool)
        .await?;
    Ok(())
}

/// Rollup table granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupGranularity {
    Hourly,
    Daily,
}

/// One hourly rollup row read back for the daily pass
#[derive(Debug, Clone)]
pub struct HourlyMetricRollup {
    pub key: (String, String, String, String),
    pub stats: BucketStats,
}

/// Hourly metric buckets in [start, end) grouped by (project, type, name, env)
pub async fn hourly_metric_rollups_in_range(
    pool: &SqlitePool,
    start: i64,
    end: i64,
) -> Result<Vec<HourlyMetricRollup>, SqliteError> {
    let rows = sqlx::query_as::<
        _,
        (String, String, String, String, i64, f64, f64, f64, f64, f64, f64, f64, f64),
    >(
        r#"SELECT project_id, type, name, env, count, sum, min, max, p50, p75, p90, p95, p99
           FROM metric_rollups_hourly
           WHERE bucket_start >= ? AND bucket_start < ?
           ORDER BY project_id, type, name, env, bucket_start"#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(project_id, metric_type, name, env, count, sum, min, max, p50, p75, p90, p95, p99)| {
                HourlyMetricRollup {
                    key: (project_id, metric_type, name, env),
                    stats: BucketStats {
                        count,
                        sum,
                        min,
                        max,
                        p50,
                        p75,
                        p90,
                        p95,
                        p99,
                    },
                }
            },
        )
        .collect())
}

/// One hourly transaction rollup row read back for the daily pass
#[derive(Debug, Clone)]
pub struct HourlyTransactionRollup {
    pub key: (String, String, String, String),
    pub stats: BucketStats,
    pub error_count: i64,
    pub apdex: ApdexBuckets,
}

/// Hourly transaction buckets in [start, end)
pub async fn hourly_transaction_rollups_in_range(
    pool: &SqlitePool,
    start: i64,
    end: i64,
) -> Result<Vec<HourlyTransactionRollup>, SqliteError> {
    use sqlx::Row;

    // 17 columns, one past the tuple decoding limit, so rows are read by name
    let rows = sqlx::query(
        r#"SELECT project_id, name, op, env, count, error_count,
                  duration_sum, duration_min, duration_max,
                  duration_p50, duration_p75, duration_p90, duration_p95, duration_p99,
                  apdex_satisfied, apdex_tolerating, apdex_frustrated
           FROM transaction_rollups_hourly
           WHERE bucket_start >= ? AND bucket_start < ?
           ORDER BY project_id, name, op, env, bucket_start"#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    let mut result = Vec::with_capacity(rows.len());
    for row in rows {
        result.push(HourlyTransactionRollup {
            key: (
                row.try_get("project_id")?,
                row.try_get("name")?,
                row.try_get("op")?,
                row.try_get("env")?,
            ),
            stats: BucketStats {
                count: row.try_get("count")?,
                sum: row.try_get("duration_sum")?,
                min: row.try_get("duration_min")?,
                max: row.try_get("duration_max")?,
                p50: row.try_get("duration_p50")?,
                p75: row.try_get("duration_p75")?,
                p90: row.try_get("duration_p90")?,
                p95: row.try_get("duration_p95")?,
                p99: row.try_get("duration_p99")?,
            },
            error_count: row.try_get("error_count")?,
            apdex: ApdexBuckets {
                satisfied: row.try_get("apdex_satisfied")?,
                tolerating: row.try_get("apdex_tolerating")?,
                frustrated: row.try_get("apdex_frustrated")?,
            },
        });
    }

    Ok(result)
}

// ============================================================================
// Retention
// ============================================================================

/// Delete raw samples older than the cutoff; returns (metrics, transactions)
pub async fn delete_raw_older_than(
    pool: &SqlitePool,
    cutoff: i64,
) -> Result<(u64, u64), SqliteError> {
    let metrics = sqlx::query("DELETE FROM performance_metrics WHERE timestamp < ?")
        .bind(cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    let transactions = sqlx::query("DELETE FROM transactions WHERE timestamp < ?")
        .bind(cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    Ok((metrics, transactions))
}

/// Delete hourly rollups older than the cutoff; returns (metrics, transactions)
pub async fn delete_hourly_rollups_older_than(
    pool: &SqlitePool,
    cutoff: i64,
) -> Result<(u64, u64), SqliteError> {
    let metrics = sqlx::query("DELETE FROM metric_rollups_hourly WHERE bucket_start < ?")
        .bind(cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    let transactions =
        sqlx::query("DELETE FROM transaction_rollups_hourly WHERE bucket_start < ?")
            .bind(cutoff)
            .execute(pool)
            .await?
            .rows_affected();

    Ok((metrics, transactions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::test_pool;

    fn metric(name: &str, value: f64, timestamp: i64) -> MetricRecord {
        MetricRecord {
            project_id: "default".to_string(),
            metric_type: "web_vital".to_string(),
            name: name.to_string(),
            env: "production".to_string(),
            value,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_metric_values_grouping() {
        let pool = test_pool().await;
        insert_metric(&pool, &metric("lcp", 1200.0, 100)).await.unwrap();
        insert_metric(&pool, &metric("lcp", 900.0, 200)).await.unwrap();
        insert_metric(&pool, &metric("cls", 0.2, 150)).await.unwrap();
        // Outside the range
        insert_metric(&pool, &metric("lcp", 5000.0, 5000)).await.unwrap();

        let groups = metric_values_in_range(&pool, 0, 1000).await.unwrap();
        assert_eq!(groups.len(), 2);
        let lcp = groups
            .iter()
            .find(|(key, _)| key.2 == "lcp")
            .map(|(_, values)| values.clone())
            .unwrap();
        assert_eq!(lcp.len(), 2);
    }

    #[tokio::test]
    async fn test_rollup_upsert_is_idempotent() {
        let pool = test_pool().await;
        let key = (
            "default".to_string(),
            "web_vital".to_string(),
            "lcp".to_string(),
            "production".to_string(),
        );
        let stats = BucketStats {
            count: 2,
            sum: 2100.0,
            min: 900.0,
            max: 1200.0,
            p50: 1050.0,
            p75: 1200.0,
            p90: 1200.0,
            p95: 1200.0,
            p99: 1200.0,
        };

        upsert_metric_rollup(&pool, RollupGranularity::Hourly, &key, 0, &stats)
            .await
            .unwrap();
        upsert_metric_rollup(&pool, RollupGranularity::Hourly, &key, 0, &stats)
            .await
            .unwrap();

        let rollups = hourly_metric_rollups_in_range(&pool, 0, 1000).await.unwrap();
        assert_eq!(rollups.len(), 1);
        assert_eq!(rollups[0].stats, stats);
    }

    #[tokio::test]
    async fn test_delete_raw_older_than() {
        let pool = test_pool().await;
        insert_metric(&pool, &metric("lcp", 1200.0, 100)).await.unwrap();
        insert_metric(&pool, &metric("lcp", 900.0, 2000)).await.unwrap();

        let (metrics, transactions) = delete_raw_older_than(&pool, 1000).await.unwrap();
        assert_eq!(metrics, 1);
        assert_eq!(transactions, 0);
    }
}
