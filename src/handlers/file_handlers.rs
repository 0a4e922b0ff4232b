//! HTTP handler for the per-partition file listing.

use crate::{
    errors::AppError,
    services::stats_service::{FileQuery, StatsService},
};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

/// Query params accepted by `GET /files`.
#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    pub owner: i64,
    /// Partition token. May be omitted when `bucket` is given.
    pub partition: Option<String>,
    /// Bucket id; used to resolve the partition when no token is supplied,
    /// and to narrow the listing.
    pub bucket: Option<i64>,
    #[serde(rename = "file-id")]
    pub file_id: Option<i64>,
    #[serde(rename = "file-name")]
    pub file_name: Option<String>,
}

/// GET `/files` — one page of file rows for an owner inside one partition.
pub async fn list_files(
    State(service): State<StatsService>,
    Query(q): Query<FilesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let partition = match (q.partition, q.bucket) {
        (Some(partition), _) => partition,
        (None, Some(bucket_id)) => service.resolve_partition(bucket_id).await?,
        (None, None) => {
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                "either `partition` or `bucket` is required",
            ));
        }
    };

    let query = FileQuery {
        file_id: q.file_id,
        file_name: q.file_name,
        bucket_id: q.bucket,
    };
    let files = service.list_files(q.owner, &partition, &query).await?;

    Ok(Json(json!({
        "owner": q.owner,
        "partition": partition,
        "files": files,
    })))
}
