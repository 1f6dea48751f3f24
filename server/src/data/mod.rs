//! Data storage layer
//!
//! - `sqlite` - Transactional store: issues, occurrences, rules, rollups,
//!   and the durable job queue
//! - `cache` - In-memory and Redis caching, admission counters, rate limiting
//! - `topics` - Fire-and-forget realtime pub/sub
//! - `types` - Shared data types across the storage layer

pub mod cache;
pub mod sqlite;
pub mod topics;
pub mod types;

pub use cache::{CacheService, RateLimiter};
pub use sqlite::{SqliteError, SqliteService};
pub use topics::{TopicError, TopicService};
