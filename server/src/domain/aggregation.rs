//! Aggregation service
//!
//! Rolls raw performance data into hourly and daily buckets for long-term
//! retention and fast historical queries. Percentiles are exact at the hourly
//! level (computed over the sorted raw values); the daily pass rolls hourly
//! buckets up with count-weighted percentile averages, which is approximate
//! and good enough for daily-granularity views.
//!
//! Every bucket write is an upsert on the grouping key, so re-running a
//! failed or repeated job overwrites instead of double-counting.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::retention;
use crate::core::config::RetentionConfig;
use crate::core::constants::{APDEX_SATISFIED_MS, APDEX_TOLERATING_MS};
use crate::data::sqlite::repositories::jobs::JobRow;
use crate::data::sqlite::repositories::performance::{self, RollupGranularity};
use crate::data::sqlite::{SqliteError, SqliteService};
use crate::data::types::{ApdexBuckets, BucketStats};
use crate::queue::{AggregationJob, AggregationKind, JobHandler, JobOutcome, QueueClass};
use crate::utils::time::day_start_ms;

const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 24 * HOUR_MS;

// ============================================================================
// STATISTICS
// ============================================================================

/// Exact percentile with linear interpolation over sorted values
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = p * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }

    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

/// Count/sum/min/max and the exact percentile ladder for one bucket
pub fn bucket_stats(values: &mut [f64]) -> BucketStats {
    if values.is_empty() {
        return BucketStats::default();
    }

    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    BucketStats {
        count: values.len() as i64,
        sum: values.iter().sum(),
        min: values[0],
        max: values[values.len() - 1],
        p50: percentile(values, 0.50),
        p75: percentile(values, 0.75),
        p90: percentile(values, 0.90),
        p95: percentile(values, 0.95),
        p99: percentile(values, 0.99),
    }
}

/// Apdex buckets over transaction durations (milliseconds)
pub fn apdex_buckets(durations: &[f64]) -> ApdexBuckets {
    let mut buckets = ApdexBuckets::default();
    for &d in durations {
        if d < APDEX_SATISFIED_MS {
            buckets.satisfied += 1;
        } else if d < APDEX_TOLERATING_MS {
            buckets.tolerating += 1;
        } else {
            buckets.frustrated += 1;
        }
    }
    buckets
}

/// Count-weighted average of per-bucket percentile values (daily rollup)
fn weighted_percentile(parts: &[(f64, i64)]) -> f64 {
    let total: i64 = parts.iter().map(|(_, count)| count).sum();
    if total == 0 {
        return 0.0;
    }
    parts
        .iter()
        .map(|(value, count)| value * (*count as f64))
        .sum::<f64>()
        / total as f64
}

// ============================================================================
// HOURLY ROLLUPS
// ============================================================================

/// Roll raw metrics and transactions into hourly buckets for a target day.
///
/// Walks the 24 hours of the day; each (grouping, hour) bucket is recomputed
/// from raw values and upserted. Returns the number of buckets written.
pub async fn rollup_hourly(
    database: &SqliteService,
    target_day_ms: i64,
) -> Result<usize, SqliteError> {
    let pool = database.pool();
    let day_start = target_day_ms;
    let mut buckets_written = 0usize;

    for hour in 0..24 {
        let hour_start = day_start + hour * HOUR_MS;
        let hour_end = hour_start + HOUR_MS;

        for (key, mut values) in
            performance::metric_values_in_range(pool, hour_start, hour_end).await?
        {
            let stats = bucket_stats(&mut values);
            performance::upsert_metric_rollup(
                pool,
                RollupGranularity::Hourly,
                &key,
                hour_start,
                &stats,
            )
            .await?;
            buckets_written += 1;
        }

        for (key, samples) in
            performance::transaction_values_in_range(pool, hour_start, hour_end).await?
        {
            let mut durations: Vec<f64> = samples.iter().map(|(d, _)| *d).collect();
            let error_count = samples.iter().filter(|(_, is_error)| *is_error).count() as i64;
            let apdex = apdex_buckets(&durations);
            let stats = bucket_stats(&mut durations);

            performance::upsert_transaction_rollup(
                pool,
                RollupGranularity::Hourly,
                &key,
                hour_start,
                &stats,
                error_count,
                &apdex,
            )
            .await?;
            buckets_written += 1;
        }
    }

    tracing::info!(
        target_day_ms,
        buckets_written,
        "Hourly rollup complete"
    );
    Ok(buckets_written)
}

// ============================================================================
// DAILY ROLLUPS
// ============================================================================

/// Roll hourly buckets into daily buckets for a target day.
///
/// min/max are exact; percentiles are count-weighted averages of the hourly
/// percentiles (approximate). Returns the number of daily buckets written.
pub async fn rollup_daily(
    database: &SqliteService,
    target_day_ms: i64,
) -> Result<usize, SqliteError> {
    let pool = database.pool();
    let day_start = target_day_ms;
    let day_end = day_start + DAY_MS;
    let mut buckets_written = 0usize;

    // Metrics: accumulate per grouping key across the day's hourly buckets
    let mut metric_groups: BTreeMap<(String, String, String, String), Vec<BucketStats>> =
        BTreeMap::new();
    for rollup in performance::hourly_metric_rollups_in_range(pool, day_start, day_end).await? {
        metric_groups.entry(rollup.key).or_default().push(rollup.stats);
    }

    for (key, parts) in metric_groups {
        let stats = merge_stats(&parts);
        performance::upsert_metric_rollup(pool, RollupGranularity::Daily, &key, day_start, &stats)
            .await?;
        buckets_written += 1;
    }

    // Transactions: same accumulation plus error counts and Apdex sums
    #[allow(clippy::type_complexity)]
    let mut tx_groups: BTreeMap<
        (String, String, String, String),
        (Vec<BucketStats>, i64, ApdexBuckets),
    > = BTreeMap::new();
    for rollup in
        performance::hourly_transaction_rollups_in_range(pool, day_start, day_end).await?
    {
        let entry = tx_groups
            .entry(rollup.key)
            .or_insert_with(|| (Vec::new(), 0, ApdexBuckets::default()));
        entry.0.push(rollup.stats);
        entry.1 += rollup.error_count;
        entry.2.satisfied += rollup.apdex.satisfied;
        entry.2.tolerating += rollup.apdex.tolerating;
        entry.2.frustrated += rollup.apdex.frustrated;
    }

    for (key, (parts, error_count, apdex)) in tx_groups {
        let stats = merge_stats(&parts);
        performance::upsert_transaction_rollup(
            pool,
            RollupGranularity::Daily,
            &key,
            day_start,
            &stats,
            error_count,
            &apdex,
        )
        .await?;
        buckets_written += 1;
    }

    tracing::info!(target_day_ms, buckets_written, "Daily rollup complete");
    Ok(buckets_written)
}

/// Merge hourly bucket stats into one daily bucket
fn merge_stats(parts: &[BucketStats]) -> BucketStats {
    if parts.is_empty() {
        return BucketStats::default();
    }

    let count: i64 = parts.iter().map(|p| p.count).sum();
    let sum: f64 = parts.iter().map(|p| p.sum).sum();
    let min = parts.iter().map(|p| p.min).fold(f64::INFINITY, f64::min);
    let max = parts.iter().map(|p| p.max).fold(f64::NEG_INFINITY, f64::max);

    let weighted = |f: fn(&BucketStats) -> f64| {
        weighted_percentile(&parts.iter().map(|p| (f(p), p.count)).collect::<Vec<_>>())
    };

    BucketStats {
        count,
        sum,
        min,
        max,
        p50: weighted(|p| p.p50),
        p75: weighted(|p| p.p75),
        p90: weighted(|p| p.p90),
        p95: weighted(|p| p.p95),
        p99: weighted(|p| p.p99),
    }
}

// ============================================================================
// JOB HANDLER
// ============================================================================

/// Handler for the aggregation queue (rollups + retention cleanup)
pub struct AggregationRunner {
    database: Arc<SqliteService>,
    retention: RetentionConfig,
}

impl AggregationRunner {
    pub fn new(database: Arc<SqliteService>, retention: RetentionConfig) -> Self {
        Self {
            database,
            retention,
        }
    }

    async fn run(&self, job: &AggregationJob) -> Result<(), SqliteError> {
        // Default to yesterday when no target day is pinned
        let target_day_ms = job.target_day_ms.unwrap_or_else(|| {
            day_start_ms(Utc::now() - chrono::Duration::days(1))
        });
        // Normalize to the day boundary in case callers pass mid-day instants
        let target_day_ms = day_start_ms(
            DateTime::<Utc>::from_timestamp_millis(target_day_ms).unwrap_or_else(Utc::now),
        );

        match job.kind {
            AggregationKind::HourlyRollup => {
                rollup_hourly(&self.database, target_day_ms).await?;
            }
            AggregationKind::DailyRollup => {
                rollup_daily(&self.database, target_day_ms).await?;
            }
            AggregationKind::CleanupExpired => {
                retention::run_cleanup(&self.database, &self.retention).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobHandler for AggregationRunner {
    fn queue(&self) -> QueueClass {
        QueueClass::Aggregation
    }

    async fn execute(&self, job: &JobRow) -> JobOutcome {
        let payload: AggregationJob = match serde_json::from_str(&job.payload) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Undecodable aggregation job payload");
                return JobOutcome::Retry(format!("undecodable payload: {}", e));
            }
        };

        match self.run(&payload).await {
            Ok(()) => JobOutcome::Done,
            Err(e) => JobOutcome::Retry(e.to_string()),
        }
    }
}
