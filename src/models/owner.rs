//! Represents an owner — the tenant that buckets belong to.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered owner in the metadata store.
///
/// Owners are the top-level tenants; every bucket belongs to exactly one of
/// them. The statistics engine only ever reads this table.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Owner {
    /// Unique identifier for this owner.
    pub id: i64,

    /// Login name. Usable as an alternate filter key, not guaranteed unique.
    pub username: String,

    /// Account status (e.g. "active", "suspended").
    pub status: String,
}
