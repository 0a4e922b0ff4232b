//! Defines routes for the statistics and file listing endpoints.
//!
//! ## Structure
//! - **Reporting endpoints**
//!   - `GET /stats` — per-owner statistics tree (supports owner, bucket-id,
//!     bucket-name, limit)
//!   - `GET /files` — one page of file rows for an (owner, partition) pair
//!
//! - **Probes**
//!   - `GET /healthz` — liveness
//!   - `GET /readyz`  — readiness (database + metadata)

use crate::{
    handlers::{
        file_handlers::list_files,
        health_handlers::{healthz, readyz},
        stats_handlers::owner_stats,
    },
    services::stats_service::StatsService,
};
use axum::{Router, routing::get};

/// Build and return the router for all reporting routes.
///
/// The router carries shared state (`StatsService`) to all handlers.
pub fn routes() -> Router<StatsService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // reporting routes
        .route("/stats", get(owner_stats))
        .route("/files", get(list_files))
}
