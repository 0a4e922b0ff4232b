//! Shard routing: maps a partition token to its physical file table.
//!
//! Partition tokens are data, not schema. They arrive from the buckets
//! table or from request parameters and end up spliced into a query target,
//! so every token must pass through [`file_table_for`] — the one place
//! where validation happens — before it touches SQL.

use crate::models::bucket::Bucket;
use sqlx::SqlitePool;
use thiserror::Error;

/// Prefix shared by every per-partition file table.
const FILE_TABLE_PREFIX: &str = "bucket_files";

#[derive(Debug, Error)]
pub enum ShardError {
    #[error("partition token `{0}` is not a valid identifier")]
    InvalidPartition(String),
    #[error("bucket `{0}` not found")]
    BucketNotFound(i64),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Validate a partition token against the identifier whitelist.
///
/// Tokens are restricted to ASCII alphanumerics and underscores so they can
/// never break out of the table-name position they are spliced into.
pub fn validate_partition(token: &str) -> Result<(), ShardError> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(ShardError::InvalidPartition(token.to_string()));
    }
    Ok(())
}

/// Build the physical table name for a partition token.
pub fn file_table_for(token: &str) -> Result<String, ShardError> {
    validate_partition(token)?;
    Ok(format!("{}_{}", FILE_TABLE_PREFIX, token))
}

/// Look up the bucket record that pins `bucket_id` to its partition.
///
/// Single metadata row read. Returns `BucketNotFound` if the id does not
/// exist.
pub async fn locate_bucket(db: &SqlitePool, bucket_id: i64) -> Result<Bucket, ShardError> {
    sqlx::query_as::<_, Bucket>(
        "SELECT bucket_id, bucket_name, owner_id, partition, created_at
         FROM buckets WHERE bucket_id = ?",
    )
    .bind(bucket_id)
    .fetch_one(db)
    .await
    .map_err(|err| match err {
        sqlx::Error::RowNotFound => ShardError::BucketNotFound(bucket_id),
        other => ShardError::Sqlx(other),
    })
}
