//! Worker pool for one job class
//!
//! Claims up to `concurrency` jobs at a time and runs them concurrently,
//! sleeping only when the queue is empty. Claiming is atomic in the database,
//! so any number of worker processes can drain the same queue.
//!
//! Handlers see at-least-once delivery: a worker crash after processing but
//! before completion re-delivers the job, which is why every handler path
//! must be idempotent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use super::QueueClass;
use crate::core::constants::{
    QUEUE_COMPLETED_RETENTION_SECS, QUEUE_MAINTENANCE_INTERVAL_SECS, QUEUE_PARKED_RETENTION_SECS,
    QUEUE_POLL_INTERVAL_MS,
};
use crate::data::sqlite::SqliteService;
use crate::data::sqlite::repositories::jobs::{self, JobRow};

/// Result of one handler execution
#[derive(Debug)]
pub enum JobOutcome {
    /// Processed; the job is marked completed
    Done,
    /// Transient failure; retried with backoff until attempts run out
    Retry(String),
}

/// Handler for one job class
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    fn queue(&self) -> QueueClass;

    async fn execute(&self, job: &JobRow) -> JobOutcome;
}

/// Worker pool for a single queue class
pub struct Worker {
    database: Arc<SqliteService>,
    handler: Arc<dyn JobHandler>,
    concurrency: usize,
}

impl Worker {
    pub fn new(
        database: Arc<SqliteService>,
        handler: Arc<dyn JobHandler>,
        concurrency: usize,
    ) -> Self {
        Self {
            database,
            handler,
            concurrency: concurrency.max(1),
        }
    }

    /// Start the worker loop
    pub fn start(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let queue = self.handler.queue();
            tracing::debug!(
                queue = queue.name(),
                concurrency = self.concurrency,
                "Worker started"
            );

            let poll_interval = Duration::from_millis(QUEUE_POLL_INTERVAL_MS);

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                // Claim up to `concurrency` runnable jobs
                let mut tasks = JoinSet::new();
                let mut claimed = 0usize;
                for _ in 0..self.concurrency {
                    let now = chrono::Utc::now().timestamp_millis();
                    match jobs::claim_next(self.database.pool(), queue.name(), now).await {
                        Ok(Some(job)) => {
                            claimed += 1;
                            let handler = Arc::clone(&self.handler);
                            let database = Arc::clone(&self.database);
                            tasks.spawn(async move {
                                execute_one(&database, handler.as_ref(), job).await;
                            });
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::error!(queue = queue.name(), error = %e, "Failed to claim job");
                            break;
                        }
                    }
                }

                if claimed == 0 {
                    // Queue empty - wait for work or shutdown
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                } else {
                    // Finish the claimed batch (jobs are never cancelled
                    // mid-flight, shutdown waits for them)
                    while let Some(result) = tasks.join_next().await {
                        if let Err(e) = result {
                            tracing::error!(queue = queue.name(), error = ?e, "Job task panicked");
                        }
                    }
                }
            }

            tracing::debug!(queue = queue.name(), "Worker stopped");
        })
    }
}

async fn execute_one(database: &SqliteService, handler: &dyn JobHandler, job: JobRow) {
    let queue = handler.queue();
    tracing::debug!(queue = queue.name(), job_id = %job.id, kind = %job.kind, "Processing job");

    match handler.execute(&job).await {
        JobOutcome::Done => {
            if let Err(e) = jobs::complete(database.pool(), &job.id).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to mark job completed");
            }
        }
        JobOutcome::Retry(error) => {
            match jobs::fail(database.pool(), &job, &error, queue.backoff_base_ms()).await {
                Ok(parked) => {
                    if parked {
                        tracing::error!(
                            queue = queue.name(),
                            job_id = %job.id,
                            attempts = job.attempts,
                            %error,
                            "Job parked after exhausting retries"
                        );
                    } else {
                        tracing::warn!(
                            queue = queue.name(),
                            job_id = %job.id,
                            attempt = job.attempts,
                            %error,
                            "Job failed, will retry"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to record job failure");
                }
            }
        }
    }
}

/// Periodic queue maintenance: prune finished jobs past retention
pub fn start_maintenance_task(
    database: Arc<SqliteService>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(QUEUE_MAINTENANCE_INTERVAL_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let now = chrono::Utc::now().timestamp_millis();
                    let completed_cutoff = now - QUEUE_COMPLETED_RETENTION_SECS * 1000;
                    let parked_cutoff = now - QUEUE_PARKED_RETENTION_SECS * 1000;
                    match jobs::prune(database.pool(), completed_cutoff, parked_cutoff).await {
                        Ok(0) => {}
                        Ok(pruned) => tracing::debug!(pruned, "Pruned finished jobs"),
                        Err(e) => tracing::warn!(error = %e, "Queue maintenance failed"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::test_service;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        executed: Arc<AtomicUsize>,
        fail_first: bool,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        fn queue(&self) -> QueueClass {
            QueueClass::Events
        }

        async fn execute(&self, job: &JobRow) -> JobOutcome {
            let n = self.executed.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 && job.attempts == 1 {
                JobOutcome::Retry("transient".to_string())
            } else {
                JobOutcome::Done
            }
        }
    }

    async fn wait_until_completed(database: &SqliteService, queue: &str, expected: i64) {
        for _ in 0..500 {
            let counts = jobs::counts(database.pool(), queue).await.unwrap();
            if counts.completed == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue {} never reached {} completed jobs", queue, expected);
    }

    #[tokio::test]
    async fn test_worker_processes_job() {
        let database = Arc::new(test_service().await);
        let executed = Arc::new(AtomicUsize::new(0));

        jobs::enqueue(database.pool(), "events", "process-event", "{}", 3, 0, None)
            .await
            .unwrap();

        let handler = Arc::new(CountingHandler {
            executed: Arc::clone(&executed),
            fail_first: false,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Worker::new(Arc::clone(&database), handler, 2).start(shutdown_rx);

        wait_until_completed(&database, "events", 1).await;

        assert_eq!(executed.load(Ordering::SeqCst), 1);
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_retries_transient_failure() {
        let database = Arc::new(test_service().await);
        let executed = Arc::new(AtomicUsize::new(0));

        // Enqueue with run_at in the past so the retry backoff (1s) is the
        // only delay in play
        jobs::enqueue(database.pool(), "events", "process-event", "{}", 3, 0, None)
            .await
            .unwrap();

        let handler = Arc::new(CountingHandler {
            executed: Arc::clone(&executed),
            fail_first: true,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Worker::new(Arc::clone(&database), handler, 1).start(shutdown_rx);

        wait_until_completed(&database, "events", 1).await;

        // First attempt failed, second succeeded
        assert_eq!(executed.load(Ordering::SeqCst), 2);
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
