//! src/services/stats_service.rs
//!
//! StatsService — the sharded statistics aggregation engine. Resolves which
//! (owner, bucket, partition) combinations a request covers, fans one
//! aggregate query out per combination, and merges whatever came back into
//! a per-owner statistics tree. A failed partition never fails the request;
//! it is reported alongside the merged tree instead.

use crate::models::{
    file::FileRecord,
    owner::Owner,
    stats::{OwnerStat, PartitionStat, SkippedPartition, StatsReport},
};
use crate::services::shard::{self, ShardError};
use futures::future::join_all;
use sqlx::{QueryBuilder, Row, SqlitePool, sqlite::Sqlite};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Page size for file listings.
const FILE_PAGE_SIZE: i64 = 20;

/// Filters recognized by a statistics request.
///
/// All fields are optional. Bucket filters may be combined with the owner
/// filter; they are ANDed.
#[derive(Clone, Debug, Default)]
pub struct StatsFilter {
    pub owner_name: Option<String>,
    pub bucket_id: Option<i64>,
    pub bucket_name: Option<String>,
    /// Cap on distinct partitions considered per owner. 0 means unlimited.
    pub partition_limit: u32,
}

impl StatsFilter {
    fn has_bucket_filter(&self) -> bool {
        self.bucket_id.is_some() || self.bucket_name.is_some()
    }
}

/// Filters accepted by the file listing path.
#[derive(Clone, Debug, Default)]
pub struct FileQuery {
    pub file_id: Option<i64>,
    /// Substring match on the file name.
    pub file_name: Option<String>,
    pub bucket_id: Option<i64>,
}

/// One unit of concurrent work: a single bucket in a single partition,
/// owned by a single owner.
#[derive(Clone, Debug)]
struct WorkItem {
    owner_id: i64,
    owner_name: String,
    bucket_id: i64,
    bucket_name: String,
    partition: String,
}

/// Raw aggregate for one work item, already unit-normalized.
#[derive(Clone, Copy, Debug, Default)]
struct PartitionTotals {
    file_count: i64,
    total_size: f64,
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error(transparent)]
    Shard(#[from] ShardError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StatsResult<T> = Result<T, StatsError>;

/// StatsService runs the fan-out/fan-in aggregation over the sharded store.
///
/// The service owns nothing beyond a connection pool and one policy flag;
/// every request resolves, fetches, and merges from scratch. Each fetch
/// task issues its own independent read query — there is no shared
/// transaction or cursor.
#[derive(Clone)]
pub struct StatsService {
    /// Shared SQLite pool for both metadata and per-partition queries.
    pub db: Arc<SqlitePool>,

    /// Whether (owner, bucket, partition) combinations with zero files are
    /// kept in the result tree. Applied uniformly to every query shape.
    pub include_empty: bool,
}

impl StatsService {
    pub fn new(db: Arc<SqlitePool>, include_empty: bool) -> Self {
        Self { db, include_empty }
    }

    /// Run a full statistics request.
    ///
    /// Resolution errors (the metadata queries that decide what to fetch)
    /// fail the request; fetch errors after that point degrade to `skipped`
    /// entries in the report.
    pub async fn collect_owner_stats(&self, filter: &StatsFilter) -> StatsResult<StatsReport> {
        let (owners, items) = self.resolve_work_items(filter).await?;
        debug!(
            owners = owners.len(),
            work_items = items.len(),
            "resolved statistics request"
        );

        let (stats, mut skipped) = self.run_fan_out(items).await;
        skipped.sort_by(|a, b| (a.owner_id, &a.partition).cmp(&(b.owner_id, &b.partition)));

        Ok(StatsReport {
            owners: merge(owners, stats),
            skipped,
        })
    }

    /// Resolve the owners a request covers and their candidate
    /// (bucket, partition) combinations.
    ///
    /// With a bucket filter the join query answers directly and only owners
    /// with a matching bucket appear. Without one, owners are listed first
    /// and their buckets walked per owner, so an owner with no buckets still
    /// shows up (with zero totals) in the final tree.
    async fn resolve_work_items(
        &self,
        filter: &StatsFilter,
    ) -> StatsResult<(Vec<Owner>, Vec<WorkItem>)> {
        if filter.has_bucket_filter() {
            self.resolve_direct(filter).await
        } else {
            self.resolve_indirect(filter).await
        }
    }

    async fn resolve_direct(
        &self,
        filter: &StatsFilter,
    ) -> StatsResult<(Vec<Owner>, Vec<WorkItem>)> {
        #[derive(sqlx::FromRow)]
        struct DirectRow {
            id: i64,
            username: String,
            status: String,
            bucket_id: i64,
            bucket_name: String,
            partition: String,
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT o.id, o.username, o.status, b.bucket_id, b.bucket_name, b.partition \
             FROM owners o JOIN buckets b ON o.id = b.owner_id WHERE 1 = 1",
        );
        if let Some(owner_name) = &filter.owner_name {
            builder.push(" AND o.username = ");
            builder.push_bind(owner_name);
        }
        if let Some(bucket_id) = filter.bucket_id {
            builder.push(" AND b.bucket_id = ");
            builder.push_bind(bucket_id);
        }
        if let Some(bucket_name) = &filter.bucket_name {
            builder.push(" AND b.bucket_name = ");
            builder.push_bind(bucket_name);
        }
        // Stable order makes per-owner limit truncation deterministic.
        builder.push(" ORDER BY o.id, b.partition, b.bucket_id");

        let rows: Vec<DirectRow> = builder.build_query_as().fetch_all(&*self.db).await?;

        let limit = filter.partition_limit as usize;
        let mut owners: Vec<Owner> = Vec::new();
        let mut items = Vec::new();
        let mut seen_partitions: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for row in rows {
            if owners.last().map(|o| o.id) != Some(row.id) {
                owners.push(Owner {
                    id: row.id,
                    username: row.username.clone(),
                    status: row.status.clone(),
                });
            }
            let seen = seen_partitions.entry(row.id).or_default();
            if !seen.contains(&row.partition) {
                if limit > 0 && seen.len() >= limit {
                    continue;
                }
                seen.push(row.partition.clone());
            }
            items.push(WorkItem {
                owner_id: row.id,
                owner_name: row.username,
                bucket_id: row.bucket_id,
                bucket_name: row.bucket_name,
                partition: row.partition,
            });
        }

        Ok((owners, items))
    }

    async fn resolve_indirect(
        &self,
        filter: &StatsFilter,
    ) -> StatsResult<(Vec<Owner>, Vec<WorkItem>)> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT id, username, status FROM owners WHERE 1 = 1");
        if let Some(owner_name) = &filter.owner_name {
            builder.push(" AND username = ");
            builder.push_bind(owner_name);
        }
        builder.push(" ORDER BY id");

        let owners: Vec<Owner> = builder.build_query_as().fetch_all(&*self.db).await?;

        let mut items = Vec::new();
        for owner in &owners {
            items.extend(self.owner_work_items(owner, filter.partition_limit).await?);
        }
        Ok((owners, items))
    }

    /// Enumerate one owner's (bucket, partition) combinations, truncated to
    /// the first `limit` distinct partitions in partition order.
    ///
    /// A partition holding several of the owner's buckets yields one work
    /// item per bucket, so the merged tree gets one row per bucket rather
    /// than one per partition.
    async fn owner_work_items(&self, owner: &Owner, limit: u32) -> StatsResult<Vec<WorkItem>> {
        #[derive(sqlx::FromRow)]
        struct BucketRow {
            bucket_id: i64,
            bucket_name: String,
            partition: String,
        }

        let rows: Vec<BucketRow> = sqlx::query_as(
            "SELECT bucket_id, bucket_name, partition FROM buckets \
             WHERE owner_id = ? ORDER BY partition, bucket_id",
        )
        .bind(owner.id)
        .fetch_all(&*self.db)
        .await?;

        let mut items = Vec::new();
        let mut partitions: Vec<String> = Vec::new();
        for row in rows {
            if !partitions.contains(&row.partition) {
                if limit > 0 && partitions.len() >= limit as usize {
                    // Rows are partition-ordered, nothing further qualifies.
                    break;
                }
                partitions.push(row.partition.clone());
            }
            items.push(WorkItem {
                owner_id: owner.id,
                owner_name: owner.username.clone(),
                bucket_id: row.bucket_id,
                bucket_name: row.bucket_name,
                partition: row.partition,
            });
        }
        Ok(items)
    }

    /// Dispatch one task per work item and drain everything through a single
    /// results channel once every task has finished.
    ///
    /// A task that fails contributes a skip record instead of aborting the
    /// request. Collection order is whatever the scheduler produced; the
    /// merge step sorts before presenting.
    async fn run_fan_out(
        &self,
        items: Vec<WorkItem>,
    ) -> (Vec<PartitionStat>, Vec<SkippedPartition>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = Vec::with_capacity(items.len());
        for item in items {
            let db = Arc::clone(&self.db);
            let tx = tx.clone();
            tasks.push(tokio::spawn(async move {
                let result =
                    fetch_partition_stats(&db, item.owner_id, &item.partition, Some(item.bucket_id))
                        .await;
                // The receiver outlives every sender, so send cannot fail.
                let _ = tx.send((item, result));
            }));
        }
        drop(tx);
        join_all(tasks).await;

        let mut stats = Vec::new();
        let mut skipped = Vec::new();
        while let Some((item, result)) = rx.recv().await {
            match result {
                Ok(totals) => {
                    if totals.file_count == 0 && !self.include_empty {
                        debug!(
                            owner = item.owner_id,
                            partition = %item.partition,
                            "dropping empty partition"
                        );
                        continue;
                    }
                    stats.push(PartitionStat {
                        partition: item.partition,
                        owner_id: item.owner_id,
                        owner_name: item.owner_name,
                        bucket_id: item.bucket_id,
                        bucket_name: item.bucket_name,
                        file_count: totals.file_count,
                        total_size: totals.total_size,
                    });
                }
                Err(err) => {
                    warn!(
                        owner = item.owner_id,
                        partition = %item.partition,
                        error = %err,
                        "partition fetch failed, continuing without it"
                    );
                    skipped.push(SkippedPartition {
                        owner_id: item.owner_id,
                        partition: item.partition,
                        reason: err.to_string(),
                    });
                }
            }
        }
        (stats, skipped)
    }

    /// List up to one page of file rows for an owner inside one partition.
    ///
    /// Plain filtered query against the partition's physical table; no
    /// aggregation and no fan-out. A partition whose table was never created
    /// on this store yields an empty page.
    pub async fn list_files(
        &self,
        owner_id: i64,
        partition: &str,
        query: &FileQuery,
    ) -> StatsResult<Vec<FileRecord>> {
        let table = shard::file_table_for(partition)?;

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT file_id, file_name, bucket_id, file_size, status FROM {table} \
             WHERE bucket_id IN (SELECT bucket_id FROM buckets WHERE owner_id = "
        ));
        builder.push_bind(owner_id);
        builder.push(" AND partition = ");
        builder.push_bind(partition);
        builder.push(")");
        if let Some(file_id) = query.file_id {
            builder.push(" AND file_id = ");
            builder.push_bind(file_id);
        }
        if let Some(file_name) = &query.file_name {
            builder.push(" AND file_name LIKE ");
            builder.push_bind(format!("%{}%", file_name));
        }
        if let Some(bucket_id) = query.bucket_id {
            builder.push(" AND bucket_id = ");
            builder.push_bind(bucket_id);
        }
        builder.push(" ORDER BY file_id LIMIT ");
        builder.push_bind(FILE_PAGE_SIZE);

        let mut files: Vec<FileRecord> = match builder.build_query_as().fetch_all(&*self.db).await
        {
            Ok(files) => files,
            Err(err) if is_missing_table(&err) => Vec::new(),
            Err(err) => return Err(StatsError::Sqlx(err)),
        };
        for file in &mut files {
            file.file_size /= 1024.0;
        }
        Ok(files)
    }

    /// Resolve the partition a bucket is pinned to.
    pub async fn resolve_partition(&self, bucket_id: i64) -> StatsResult<String> {
        let bucket = shard::locate_bucket(&self.db, bucket_id).await?;
        Ok(bucket.partition)
    }
}

/// Aggregate file count and total size for one owner inside one partition,
/// optionally narrowed to a single bucket.
///
/// A missing partition table is a normal outcome (a partition may simply
/// never have been populated on this store) and comes back as zero totals.
/// Sizes are stored in bytes and normalized to KiB here, before any
/// summation happens.
async fn fetch_partition_stats(
    db: &SqlitePool,
    owner_id: i64,
    partition: &str,
    bucket_id: Option<i64>,
) -> StatsResult<PartitionTotals> {
    let table = shard::file_table_for(partition)?;

    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "SELECT COUNT(*) AS file_count, \
         CAST(COALESCE(SUM(file_size), 0) AS REAL) AS total_size \
         FROM {table} WHERE bucket_id IN \
         (SELECT bucket_id FROM buckets WHERE owner_id = "
    ));
    builder.push_bind(owner_id);
    builder.push(" AND partition = ");
    builder.push_bind(partition);
    builder.push(")");
    if let Some(bucket_id) = bucket_id {
        builder.push(" AND bucket_id = ");
        builder.push_bind(bucket_id);
    }

    match builder.build().fetch_one(db).await {
        Ok(row) => {
            let file_count: i64 = row.try_get("file_count")?;
            let total_size: f64 = row.try_get("total_size")?;
            Ok(PartitionTotals {
                file_count,
                total_size: total_size / 1024.0,
            })
        }
        Err(err) if is_missing_table(&err) => Ok(PartitionTotals::default()),
        Err(err) => Err(StatsError::Sqlx(err)),
    }
}

/// Roll collected partition rows up into per-owner totals.
///
/// Summation is order-independent, so whatever order the fan-out delivered
/// results in, the same tree comes out. Owners that collected nothing keep
/// zero totals and an empty partition list.
fn merge(owners: Vec<Owner>, stats: Vec<PartitionStat>) -> Vec<OwnerStat> {
    let mut by_owner: BTreeMap<i64, Vec<PartitionStat>> = BTreeMap::new();
    for stat in stats {
        by_owner.entry(stat.owner_id).or_default().push(stat);
    }

    owners
        .into_iter()
        .map(|owner| {
            let mut partitions = by_owner.remove(&owner.id).unwrap_or_default();
            partitions.sort_by(|a, b| {
                (a.partition.as_str(), a.bucket_id).cmp(&(b.partition.as_str(), b.bucket_id))
            });
            let total_files = partitions.iter().map(|p| p.file_count).sum();
            let total_size = partitions.iter().map(|p| p.total_size).sum();
            OwnerStat {
                owner_id: owner.id,
                owner_name: owner.username,
                status: owner.status,
                total_files,
                total_size,
                partitions,
            }
        })
        .collect()
}

/// Return true if a SQLx error means the partition's physical table does
/// not exist on this store.
fn is_missing_table(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if db_err.message().to_ascii_lowercase().contains("no such table")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    /// A single connection keeps every query on the same in-memory database.
    async fn test_pool() -> Arc<SqlitePool> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        Arc::new(pool)
    }

    async fn exec(db: &SqlitePool, sql: &str) {
        sqlx::query(sql).execute(db).await.expect(sql);
    }

    /// Fixture covering every query shape:
    /// - u1: b1@p1 (two files), b2@p2 (empty table)
    /// - u2: five buckets across q1..q5, one file in q1
    /// - u3: d1@pgood (one 1 MiB file), d2@pbad (table with a broken schema)
    /// - u4: e1@nowhere (table never created)
    /// - u5: two buckets sharing partition pm
    async fn seed(db: &SqlitePool) {
        exec(
            db,
            "CREATE TABLE owners (
                 id INTEGER PRIMARY KEY,
                 username TEXT NOT NULL,
                 status TEXT NOT NULL
             )",
        )
        .await;
        exec(
            db,
            "CREATE TABLE buckets (
                 bucket_id INTEGER PRIMARY KEY,
                 bucket_name TEXT NOT NULL,
                 owner_id INTEGER NOT NULL,
                 partition TEXT NOT NULL,
                 created_at TEXT NOT NULL
             )",
        )
        .await;
        exec(
            db,
            "INSERT INTO owners (id, username, status) VALUES
             (1, 'u1', 'active'),
             (2, 'u2', 'active'),
             (3, 'u3', 'active'),
             (4, 'u4', 'active'),
             (5, 'u5', 'suspended')",
        )
        .await;
        exec(
            db,
            "INSERT INTO buckets (bucket_id, bucket_name, owner_id, partition, created_at) VALUES
             (1, 'b1', 1, 'p1', '2026-01-01T00:00:00Z'),
             (2, 'b2', 1, 'p2', '2026-01-01T00:00:00Z'),
             (3, 'c1', 2, 'q1', '2026-01-01T00:00:00Z'),
             (4, 'c2', 2, 'q2', '2026-01-01T00:00:00Z'),
             (5, 'c3', 2, 'q3', '2026-01-01T00:00:00Z'),
             (6, 'c4', 2, 'q4', '2026-01-01T00:00:00Z'),
             (7, 'c5', 2, 'q5', '2026-01-01T00:00:00Z'),
             (8, 'd1', 3, 'pgood', '2026-01-01T00:00:00Z'),
             (9, 'd2', 3, 'pbad', '2026-01-01T00:00:00Z'),
             (10, 'e1', 4, 'nowhere', '2026-01-01T00:00:00Z'),
             (12, 'm1', 5, 'pm', '2026-01-01T00:00:00Z'),
             (13, 'm2', 5, 'pm', '2026-01-01T00:00:00Z')",
        )
        .await;

        for partition in ["p1", "p2", "q1", "q2", "q3", "q4", "q5", "pgood", "pm"] {
            exec(
                db,
                &format!(
                    "CREATE TABLE bucket_files_{partition} (
                         file_id INTEGER PRIMARY KEY,
                         file_name TEXT NOT NULL,
                         bucket_id INTEGER NOT NULL,
                         file_size REAL NOT NULL,
                         status TEXT NOT NULL DEFAULT 'ok'
                     )"
                ),
            )
            .await;
        }
        // Deliberately broken shape: aggregate queries against it fail.
        exec(
            db,
            "CREATE TABLE bucket_files_pbad (
                 file_id INTEGER PRIMARY KEY,
                 file_name TEXT NOT NULL
             )",
        )
        .await;

        exec(
            db,
            "INSERT INTO bucket_files_p1 (file_id, file_name, bucket_id, file_size, status) VALUES
             (1, 'a.bin', 1, 2048, 'ok'),
             (2, 'b.bin', 1, 4096, 'ok')",
        )
        .await;
        exec(
            db,
            "INSERT INTO bucket_files_q1 (file_id, file_name, bucket_id, file_size, status)
             VALUES (1, 'c.bin', 3, 1024, 'ok')",
        )
        .await;
        exec(
            db,
            "INSERT INTO bucket_files_pgood (file_id, file_name, bucket_id, file_size, status)
             VALUES (1, 'g.bin', 8, 1048576, 'ok')",
        )
        .await;
        exec(
            db,
            "INSERT INTO bucket_files_pm (file_id, file_name, bucket_id, file_size, status) VALUES
             (1, 'm-a.bin', 12, 1024, 'ok'),
             (2, 'm-b.bin', 13, 2048, 'ok'),
             (3, 'm-c.bin', 13, 3072, 'ok')",
        )
        .await;
    }

    async fn seeded_service(include_empty: bool) -> StatsService {
        let db = test_pool().await;
        seed(&db).await;
        StatsService::new(db, include_empty)
    }

    fn owner_filter(name: &str) -> StatsFilter {
        StatsFilter {
            owner_name: Some(name.to_string()),
            ..StatsFilter::default()
        }
    }

    #[tokio::test]
    async fn bucket_name_filter_returns_exactly_one_partition() {
        let service = seeded_service(false).await;
        let filter = StatsFilter {
            bucket_name: Some("b1".to_string()),
            ..StatsFilter::default()
        };

        let report = service.collect_owner_stats(&filter).await.unwrap();

        assert_eq!(report.owners.len(), 1);
        assert!(report.skipped.is_empty());
        let owner = &report.owners[0];
        assert_eq!(owner.owner_id, 1);
        assert_eq!(owner.total_files, 2);
        assert_eq!(owner.total_size, 6.0);
        assert_eq!(
            owner.partitions,
            vec![PartitionStat {
                partition: "p1".to_string(),
                owner_id: 1,
                owner_name: "u1".to_string(),
                bucket_id: 1,
                bucket_name: "b1".to_string(),
                file_count: 2,
                total_size: 6.0,
            }]
        );
    }

    #[tokio::test]
    async fn unfiltered_owner_keeps_empty_partition_when_enabled() {
        let service = seeded_service(true).await;
        let report = service.collect_owner_stats(&owner_filter("u1")).await.unwrap();

        assert_eq!(report.owners.len(), 1);
        let owner = &report.owners[0];
        assert_eq!(owner.total_files, 2);
        assert_eq!(owner.total_size, 6.0);
        let partitions: Vec<(&str, i64, f64)> = owner
            .partitions
            .iter()
            .map(|p| (p.partition.as_str(), p.file_count, p.total_size))
            .collect();
        assert_eq!(partitions, vec![("p1", 2, 6.0), ("p2", 0, 0.0)]);
    }

    #[tokio::test]
    async fn empty_partitions_are_dropped_when_disabled() {
        let service = seeded_service(false).await;
        let report = service.collect_owner_stats(&owner_filter("u1")).await.unwrap();

        let owner = &report.owners[0];
        assert_eq!(owner.partitions.len(), 1);
        assert_eq!(owner.partitions[0].partition, "p1");
        assert_eq!(owner.total_files, 2);
    }

    #[tokio::test]
    async fn partition_limit_truncates_deterministically() {
        let service = seeded_service(true).await;
        let filter = StatsFilter {
            owner_name: Some("u2".to_string()),
            partition_limit: 2,
            ..StatsFilter::default()
        };

        let first = service.collect_owner_stats(&filter).await.unwrap();
        let second = service.collect_owner_stats(&filter).await.unwrap();

        let owner = &first.owners[0];
        assert_eq!(owner.partitions.len(), 2);
        let partitions: Vec<&str> = owner.partitions.iter().map(|p| p.partition.as_str()).collect();
        assert_eq!(partitions, vec!["q1", "q2"]);
        assert_eq!(
            serde_json::to_value(&first.owners).unwrap(),
            serde_json::to_value(&second.owners).unwrap()
        );
    }

    #[tokio::test]
    async fn failed_partition_is_skipped_not_fatal() {
        let service = seeded_service(true).await;
        let report = service.collect_owner_stats(&owner_filter("u3")).await.unwrap();

        let owner = &report.owners[0];
        assert_eq!(owner.partitions.len(), 1);
        assert_eq!(owner.partitions[0].partition, "pgood");
        assert_eq!(owner.partitions[0].file_count, 1);
        assert_eq!(owner.partitions[0].total_size, 1024.0);
        assert_eq!(owner.total_files, 1);
        assert_eq!(owner.total_size, 1024.0);

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].owner_id, 3);
        assert_eq!(report.skipped[0].partition, "pbad");
        assert!(!report.skipped[0].reason.is_empty());
    }

    #[tokio::test]
    async fn missing_partition_table_counts_as_zero() {
        let service = seeded_service(true).await;
        let report = service.collect_owner_stats(&owner_filter("u4")).await.unwrap();

        assert!(report.skipped.is_empty());
        let owner = &report.owners[0];
        assert_eq!(owner.total_files, 0);
        assert_eq!(owner.total_size, 0.0);
        assert_eq!(owner.partitions.len(), 1);
        assert_eq!(owner.partitions[0].partition, "nowhere");
        assert_eq!(owner.partitions[0].file_count, 0);
    }

    #[tokio::test]
    async fn partition_with_two_buckets_gets_one_row_each() {
        let service = seeded_service(true).await;
        let report = service.collect_owner_stats(&owner_filter("u5")).await.unwrap();

        let owner = &report.owners[0];
        let rows: Vec<(&str, i64, f64)> = owner
            .partitions
            .iter()
            .map(|p| (p.bucket_name.as_str(), p.file_count, p.total_size))
            .collect();
        assert_eq!(rows, vec![("m1", 1, 1.0), ("m2", 2, 5.0)]);
        assert_eq!(owner.total_files, 3);
        assert_eq!(owner.total_size, 6.0);
    }

    #[tokio::test]
    async fn owner_totals_always_match_partition_sums() {
        let service = seeded_service(true).await;
        let report = service
            .collect_owner_stats(&StatsFilter::default())
            .await
            .unwrap();

        assert_eq!(report.owners.len(), 5);
        for owner in &report.owners {
            let files: i64 = owner.partitions.iter().map(|p| p.file_count).sum();
            let size: f64 = owner.partitions.iter().map(|p| p.total_size).sum();
            assert_eq!(owner.total_files, files, "owner {}", owner.owner_id);
            assert_eq!(owner.total_size, size, "owner {}", owner.owner_id);
        }

        let totals = crate::models::stats::TotalStats::from_owners(&report.owners);
        assert_eq!(totals.total_owners, 5);
        assert_eq!(totals.total_files, 7);
        assert_eq!(totals.total_size, 1037.0);
    }

    #[tokio::test]
    async fn repeated_requests_are_idempotent() {
        let service = seeded_service(true).await;
        let filter = StatsFilter::default();

        let first = service.collect_owner_stats(&filter).await.unwrap();
        let second = service.collect_owner_stats(&filter).await.unwrap();

        assert_eq!(
            serde_json::to_value(&first.owners).unwrap(),
            serde_json::to_value(&second.owners).unwrap()
        );
        assert_eq!(first.skipped, second.skipped);
    }

    #[tokio::test]
    async fn fetcher_normalizes_bytes_exactly_once() {
        let service = seeded_service(true).await;
        let totals = fetch_partition_stats(&service.db, 3, "pgood", None)
            .await
            .unwrap();
        assert_eq!(totals.file_count, 1);
        assert_eq!(totals.total_size, 1024.0);
    }

    #[tokio::test]
    async fn fetcher_accepts_owner_only_scope() {
        let service = seeded_service(true).await;
        // Both of u5's buckets in pm, no bucket narrowing.
        let totals = fetch_partition_stats(&service.db, 5, "pm", None).await.unwrap();
        assert_eq!(totals.file_count, 3);
        assert_eq!(totals.total_size, 6.0);
    }

    #[tokio::test]
    async fn malformed_partition_token_fails_before_querying() {
        let service = seeded_service(true).await;
        let err = service
            .list_files(1, "p1; DROP TABLE buckets", &FileQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StatsError::Shard(ShardError::InvalidPartition(_))
        ));
    }

    #[tokio::test]
    async fn list_files_filters_and_normalizes() {
        let service = seeded_service(true).await;

        let files = service
            .list_files(1, "p1", &FileQuery::default())
            .await
            .unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_name, "a.bin");
        assert_eq!(files[0].file_size, 2.0);
        assert_eq!(files[1].file_size, 4.0);

        let named = service
            .list_files(
                1,
                "p1",
                &FileQuery {
                    file_name: Some("a.b".to_string()),
                    ..FileQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].file_id, 1);

        let scoped = service
            .list_files(
                5,
                "pm",
                &FileQuery {
                    bucket_id: Some(13),
                    ..FileQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(scoped.len(), 2);
        assert!(scoped.iter().all(|f| f.bucket_id == 13));
    }

    #[tokio::test]
    async fn list_files_is_bounded_to_one_page() {
        let service = seeded_service(true).await;
        exec(
            &service.db,
            "INSERT INTO buckets (bucket_id, bucket_name, owner_id, partition, created_at)
             VALUES (20, 'big', 1, 'pl', '2026-01-01T00:00:00Z')",
        )
        .await;
        exec(
            &service.db,
            "CREATE TABLE bucket_files_pl (
                 file_id INTEGER PRIMARY KEY,
                 file_name TEXT NOT NULL,
                 bucket_id INTEGER NOT NULL,
                 file_size REAL NOT NULL,
                 status TEXT NOT NULL DEFAULT 'ok'
             )",
        )
        .await;
        for i in 1..=25 {
            exec(
                &service.db,
                &format!(
                    "INSERT INTO bucket_files_pl (file_id, file_name, bucket_id, file_size, status)
                     VALUES ({i}, 'f{i}.bin', 20, 1024, 'ok')"
                ),
            )
            .await;
        }

        let files = service
            .list_files(1, "pl", &FileQuery::default())
            .await
            .unwrap();
        assert_eq!(files.len(), 20);
        assert_eq!(files[0].file_id, 1);
        assert_eq!(files[19].file_id, 20);
        assert!(files.iter().all(|f| f.file_size == 1.0));
    }

    #[tokio::test]
    async fn list_files_on_absent_table_returns_empty_page() {
        let service = seeded_service(true).await;
        let files = service
            .list_files(4, "nowhere", &FileQuery::default())
            .await
            .unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn resolve_partition_reads_bucket_metadata() {
        let service = seeded_service(true).await;
        assert_eq!(service.resolve_partition(1).await.unwrap(), "p1");

        let err = service.resolve_partition(999).await.unwrap_err();
        assert!(matches!(
            err,
            StatsError::Shard(ShardError::BucketNotFound(999))
        ));
    }

    #[tokio::test]
    async fn combined_owner_and_bucket_filters_are_anded() {
        let service = seeded_service(true).await;

        let matching = StatsFilter {
            owner_name: Some("u5".to_string()),
            bucket_name: Some("m2".to_string()),
            ..StatsFilter::default()
        };
        let report = service.collect_owner_stats(&matching).await.unwrap();
        assert_eq!(report.owners.len(), 1);
        assert_eq!(report.owners[0].total_files, 2);
        assert_eq!(report.owners[0].total_size, 5.0);

        // Same bucket name, wrong owner: nothing matches.
        let disjoint = StatsFilter {
            owner_name: Some("u1".to_string()),
            bucket_name: Some("m2".to_string()),
            ..StatsFilter::default()
        };
        let report = service.collect_owner_stats(&disjoint).await.unwrap();
        assert!(report.owners.is_empty());
    }
}
