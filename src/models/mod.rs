//! Core data models for the sharded bucket statistics service.
//!
//! Owners, buckets, and file rows map to database tables via
//! `sqlx::FromRow`; the types in `stats` are derived per request and never
//! persisted. Everything serializes naturally as JSON via `serde`.

pub mod bucket;
pub mod file;
pub mod owner;
pub mod stats;
