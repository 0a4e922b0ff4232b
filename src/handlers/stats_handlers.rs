//! HTTP handlers for the statistics endpoints.
//! Parses request filters and delegates the fan-out aggregation to
//! `StatsService`.

use crate::{
    errors::AppError,
    models::stats::TotalStats,
    services::stats_service::{StatsFilter, StatsService},
};
use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;

/// Query params accepted by `GET /stats`.
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub owner: Option<String>,
    #[serde(rename = "bucket-id")]
    pub bucket_id: Option<i64>,
    #[serde(rename = "bucket-name")]
    pub bucket_name: Option<String>,
    /// Max distinct partitions per owner; 0 or absent means unlimited.
    pub limit: Option<u32>,
}

/// GET `/stats` — run the fan-out aggregation and return the owner tree.
///
/// The response always carries whatever partitions succeeded; shards that
/// failed are listed under `skipped` instead of failing the request.
pub async fn owner_stats(
    State(service): State<StatsService>,
    Query(q): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let started = Instant::now();
    let filter = StatsFilter {
        owner_name: q.owner,
        bucket_id: q.bucket_id,
        bucket_name: q.bucket_name,
        partition_limit: q.limit.unwrap_or(0),
    };

    let report = service.collect_owner_stats(&filter).await?;
    let totals = TotalStats::from_owners(&report.owners);

    let elapsed = started.elapsed();
    tracing::info!(
        owners = report.owners.len(),
        skipped = report.skipped.len(),
        ?elapsed,
        "stats request served"
    );

    Ok(Json(json!({
        "totals": totals,
        "owners": report.owners,
        "skipped": report.skipped,
        "elapsed_ms": elapsed.as_millis() as u64,
    })))
}
