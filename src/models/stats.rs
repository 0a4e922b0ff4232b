//! Derived statistics assembled per request.
//!
//! Nothing in this module is persisted. Every request recomputes these
//! values from the metadata tables and the per-partition file tables, then
//! drops them; there is no cross-request cache.

use serde::Serialize;

/// Aggregate for one (owner, bucket-in-partition) combination.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PartitionStat {
    /// Partition token the files were counted in.
    pub partition: String,

    /// Owner the counted files belong to.
    pub owner_id: i64,
    pub owner_name: String,

    /// The bucket inside the partition this row covers.
    pub bucket_id: i64,
    pub bucket_name: String,

    /// Number of file rows.
    pub file_count: i64,

    /// Total size in KiB, normalized exactly once at fetch time.
    pub total_size: f64,
}

/// Rolled-up statistics for one owner.
///
/// `total_files` and `total_size` are always the arithmetic sums over the
/// `partitions` entries.
#[derive(Serialize, Clone, Debug)]
pub struct OwnerStat {
    pub owner_id: i64,
    pub owner_name: String,
    pub status: String,
    pub total_files: i64,
    pub total_size: f64,
    pub partitions: Vec<PartitionStat>,
}

/// A partition fetch that failed and was left out of the aggregate.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SkippedPartition {
    pub owner_id: i64,
    pub partition: String,
    pub reason: String,
}

/// Full result of a statistics request: the merged owner tree plus every
/// work item that had to be skipped. One bad shard must not blind the
/// caller to all the others, so skips travel with the data rather than
/// failing the request.
#[derive(Serialize, Debug)]
pub struct StatsReport {
    pub owners: Vec<OwnerStat>,
    pub skipped: Vec<SkippedPartition>,
}

/// Store-wide roll-up across all owners in a report.
#[derive(Serialize, Debug, Default, PartialEq)]
pub struct TotalStats {
    pub total_owners: i64,
    pub total_files: i64,
    pub total_size: f64,
}

impl TotalStats {
    /// Sum every owner's already-merged totals.
    pub fn from_owners(owners: &[OwnerStat]) -> Self {
        let mut totals = TotalStats::default();
        for owner in owners {
            totals.total_owners += 1;
            totals.total_files += owner.total_files;
            totals.total_size += owner.total_size;
        }
        totals
    }
}
