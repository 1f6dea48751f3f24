//! HTTP API layer
//!
//! The admission gate and the operator surface. Heavy work never happens
//! here: accepted events go to the durable queues, rejections are fast-fail.

pub mod auth;
pub mod extractors;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod types;

use std::sync::Arc;

use tokio::sync::watch;

use crate::core::config::AppConfig;
use crate::data::cache::{AdmissionSampler, CacheService};
use crate::data::sqlite::SqliteService;
use crate::domain::RealtimePublisher;
use crate::queue::JobQueue;

pub use server::ApiServer;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub database: Arc<SqliteService>,
    pub cache: Arc<CacheService>,
    pub queue: JobQueue,
    pub sampler: Arc<AdmissionSampler>,
    pub realtime: RealtimePublisher,
    pub config: Arc<AppConfig>,
    pub shutdown_rx: watch::Receiver<bool>,
}
