//! API authentication
//!
//! - `api_key`: tenant SDK keys for ingestion endpoints
//! - `admin`: operator bearer token for the maintenance surface

pub mod admin;
pub mod api_key;

pub use admin::{AdminAuthState, admin_auth_middleware};
pub use api_key::{AuthedKey, IngestAuthState, ingest_auth_middleware};
