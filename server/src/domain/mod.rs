//! Domain logic
//!
//! The processing side of the pipeline: fingerprinting, event persistence,
//! alert evaluation, aggregation rollups, retention, and the realtime
//! publisher. Everything here runs in workers behind the durable queues;
//! the admission gate in `api` stays fast-fail and inline.

pub mod aggregation;
pub mod alerts;
pub mod events;
pub mod fingerprint;
pub mod quota;
pub mod realtime;
pub mod retention;
pub mod scrub;

pub use alerts::AlertEngine;
pub use events::EventProcessor;
pub use realtime::{IssueEvent, IssueEventKind, RealtimePublisher};
