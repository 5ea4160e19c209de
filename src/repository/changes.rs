//! SnapshotChange repository (spec §3/§4.H change tracker).

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::SnapshotChangeRecord;
use super::parse_datetime;
use super::pool::{DbError, DbPool};
use crate::models::SnapshotChange;
use crate::schema::snapshot_changes;
use crate::with_conn;

impl From<SnapshotChangeRecord> for SnapshotChange {
    fn from(r: SnapshotChangeRecord) -> Self {
        SnapshotChange {
            id: r.id,
            from_snapshot_id: r.from_snapshot_id,
            to_snapshot_id: r.to_snapshot_id,
            normalized_url_group: r.normalized_url_group,
            from_timestamp: parse_datetime(&r.from_timestamp),
            to_timestamp: parse_datetime(&r.to_timestamp),
            sections_changed: r.sections_changed,
            lines_changed: r.lines_changed,
            diff_artifact: r.diff_artifact,
            created_at: parse_datetime(&r.created_at),
        }
    }
}

impl From<&SnapshotChange> for SnapshotChangeRecord {
    fn from(c: &SnapshotChange) -> Self {
        SnapshotChangeRecord {
            id: c.id.clone(),
            from_snapshot_id: c.from_snapshot_id.clone(),
            to_snapshot_id: c.to_snapshot_id.clone(),
            normalized_url_group: c.normalized_url_group.clone(),
            from_timestamp: c.from_timestamp.to_rfc3339(),
            to_timestamp: c.to_timestamp.to_rfc3339(),
            sections_changed: c.sections_changed,
            lines_changed: c.lines_changed,
            diff_artifact: c.diff_artifact.clone(),
            created_at: c.created_at.to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct ChangeRepository {
    pool: DbPool,
}

impl ChangeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// True if a change between this exact pair already exists — used
    /// to keep `compute_changes` idempotent (spec §4.H).
    pub async fn exists_for_pair(&self, from_snapshot_id: &str, to_snapshot_id: &str) -> Result<bool, DbError> {
        use diesel::dsl::count_star;
        let count: i64 = with_conn!(self.pool, conn => {
            snapshot_changes::table
                .filter(snapshot_changes::from_snapshot_id.eq(from_snapshot_id))
                .filter(snapshot_changes::to_snapshot_id.eq(to_snapshot_id))
                .select(count_star())
                .first(&mut conn)
                .await
        })?;
        Ok(count > 0)
    }

    pub async fn insert(&self, change: &SnapshotChange) -> Result<(), DbError> {
        let record = SnapshotChangeRecord::from(change);
        with_conn!(self.pool, conn => {
            diesel::insert_into(snapshot_changes::table)
                .values(&record)
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn list_for_group(&self, normalized_url_group: &str) -> Result<Vec<SnapshotChange>, DbError> {
        let records: Vec<SnapshotChangeRecord> = with_conn!(self.pool, conn => {
            snapshot_changes::table
                .filter(snapshot_changes::normalized_url_group.eq(normalized_url_group))
                .order(snapshot_changes::to_timestamp.asc())
                .load(&mut conn)
                .await
        })?;
        Ok(records.into_iter().map(SnapshotChange::from).collect())
    }

    pub async fn compare(&self, from_snapshot_id: &str, to_snapshot_id: &str) -> Result<Option<SnapshotChange>, DbError> {
        let record: Option<SnapshotChangeRecord> = with_conn!(self.pool, conn => {
            snapshot_changes::table
                .filter(snapshot_changes::from_snapshot_id.eq(from_snapshot_id))
                .filter(snapshot_changes::to_snapshot_id.eq(to_snapshot_id))
                .first(&mut conn)
                .await
                .optional()
        })?;
        Ok(record.map(SnapshotChange::from))
    }
}
