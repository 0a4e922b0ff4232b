//! Represents a file row from a partition-specific physical table.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of a `bucket_files_<partition>` table.
///
/// File rows are only ever read in aggregate or in small pages; the engine
/// never loads a whole partition into memory.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct FileRecord {
    /// Unique identifier within the partition table.
    pub file_id: i64,

    /// Original file name.
    pub file_name: String,

    /// Bucket this file belongs to.
    pub bucket_id: i64,

    /// Size, stored in bytes, reported in KiB once it leaves the service.
    pub file_size: f64,

    /// Row status (e.g. "ok", "deleting").
    pub status: String,
}
