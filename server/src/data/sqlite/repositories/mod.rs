//! SQLite repositories
//!
//! Free functions over the shared pool. Read paths accept an optional
//! `CacheService`; pass `Some(cache)` to enable lookup-aside caching or `None`
//! to bypass it. Mutations invalidate the relevant cache keys.

pub mod api_keys;
pub mod events;
pub mod groups;
pub mod jobs;
pub mod notifications;
pub mod performance;
pub mod projects;
pub mod rules;
