//! Represents a bucket — a named collection of files pinned to one partition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A bucket in the sharded store.
///
/// A bucket belongs to exactly one owner and is assigned to exactly one
/// partition when it is created. The partition token decides which physical
/// `bucket_files_<partition>` table holds the bucket's file rows, and the
/// engine treats the assignment as immutable for the duration of a request.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Unique identifier for this bucket.
    pub bucket_id: i64,

    /// Human-readable bucket name.
    pub bucket_name: String,

    /// ID of the owner this bucket belongs to.
    pub owner_id: i64,

    /// Partition token; becomes part of the physical file table name only
    /// after passing the shard router's whitelist.
    pub partition: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}
