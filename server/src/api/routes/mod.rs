//! API route handlers

pub mod admin;
pub mod events;
pub mod health;
pub mod performance;
pub mod sse;
