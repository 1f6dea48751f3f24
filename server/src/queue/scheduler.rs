//! Nightly job scheduler
//!
//! Enqueues the aggregation and cleanup jobs at their UTC hours:
//! hourly rollup at 02:00, daily rollup at 03:00, cleanup at 04:00.
//! Enqueues carry a dedup key of kind + target day, so overlapping schedulers
//! (or a restart right after the hour) cannot double-enqueue a run.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{AggregationJob, AggregationKind, JobQueue};
use crate::core::constants::{
    SCHEDULE_CLEANUP_UTC_HOUR, SCHEDULE_DAILY_ROLLUP_UTC_HOUR, SCHEDULE_HOURLY_ROLLUP_UTC_HOUR,
};
use crate::utils::time::{day_start_ms, secs_until_utc_hour};

/// One scheduled entry
#[derive(Debug, Clone, Copy)]
struct ScheduleEntry {
    kind: AggregationKind,
    utc_hour: u32,
}

const SCHEDULE: &[ScheduleEntry] = &[
    ScheduleEntry {
        kind: AggregationKind::HourlyRollup,
        utc_hour: SCHEDULE_HOURLY_ROLLUP_UTC_HOUR,
    },
    ScheduleEntry {
        kind: AggregationKind::DailyRollup,
        utc_hour: SCHEDULE_DAILY_ROLLUP_UTC_HOUR,
    },
    ScheduleEntry {
        kind: AggregationKind::CleanupExpired,
        utc_hour: SCHEDULE_CLEANUP_UTC_HOUR,
    },
];

/// Dedup key for one scheduled run: kind + the day being processed
pub fn schedule_dedup_key(kind: AggregationKind, target_day_ms: i64) -> String {
    format!("sched:{}:{}", kind.as_str(), target_day_ms)
}

/// Start the scheduler task
pub fn start(queue: JobQueue, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!(
            hourly = SCHEDULE_HOURLY_ROLLUP_UTC_HOUR,
            daily = SCHEDULE_DAILY_ROLLUP_UTC_HOUR,
            cleanup = SCHEDULE_CLEANUP_UTC_HOUR,
            "Aggregation scheduler started (UTC hours)"
        );

        loop {
            // Sleep until the next scheduled hour
            let now = Utc::now();
            let (entry, wait_secs) = SCHEDULE
                .iter()
                .map(|entry| (entry, secs_until_utc_hour(now, entry.utc_hour)))
                .min_by_key(|(_, secs)| *secs)
                .unwrap_or((&SCHEDULE[0], 3600));

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(wait_secs.max(1))) => {
                    enqueue_entry(&queue, entry).await;
                }
            }
        }

        tracing::debug!("Aggregation scheduler stopped");
    })
}

async fn enqueue_entry(queue: &JobQueue, entry: &ScheduleEntry) {
    // Rollups target yesterday; cleanup works against retention cutoffs
    let yesterday = Utc::now() - chrono::Duration::days(1);
    let target_day_ms = day_start_ms(yesterday);

    let job = AggregationJob {
        kind: entry.kind,
        target_day_ms: Some(target_day_ms),
    };
    let dedup_key = schedule_dedup_key(entry.kind, target_day_ms);

    match queue.enqueue_aggregation(&job, Some(&dedup_key)).await {
        Ok(true) => {
            tracing::info!(kind = entry.kind.as_str(), target_day_ms, "Scheduled aggregation job");
        }
        Ok(false) => {
            tracing::debug!(kind = entry.kind.as_str(), "Aggregation job already enqueued");
        }
        Err(e) => {
            tracing::error!(kind = entry.kind.as_str(), error = %e, "Failed to enqueue aggregation job");
        }
    }
}
