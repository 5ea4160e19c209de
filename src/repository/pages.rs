//! Materialized "latest snapshot per page group" repository (spec §4.I
//! fast path: empty `q`, no date range, `view=pages`).

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::PageRecord;
use super::parse_datetime;
use super::pool::{DbError, DbPool};
use crate::schema::pages;
use crate::with_conn_split;

#[derive(Debug, Clone)]
pub struct PageRow {
    pub normalized_url_group: String,
    pub latest_snapshot_id: String,
    pub source_id: String,
    pub snapshot_count: i32,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<PageRecord> for PageRow {
    fn from(r: PageRecord) -> Self {
        PageRow {
            normalized_url_group: r.normalized_url_group,
            latest_snapshot_id: r.latest_snapshot_id,
            source_id: r.source_id,
            snapshot_count: r.snapshot_count,
            updated_at: parse_datetime(&r.updated_at),
        }
    }
}

#[derive(Clone)]
pub struct PageRepository {
    pool: DbPool,
}

impl PageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Rebuild the materialized rows for one page group from its
    /// snapshots. Called by the indexing pipeline after a job's
    /// snapshots land (spec §4.G step 8).
    pub async fn refresh_group(
        &self,
        normalized_url_group: &str,
        latest_snapshot_id: &str,
        source_id: &str,
        snapshot_count: i32,
    ) -> Result<(), DbError> {
        let record = PageRecord {
            normalized_url_group: normalized_url_group.to_string(),
            latest_snapshot_id: latest_snapshot_id.to_string(),
            source_id: source_id.to_string(),
            snapshot_count,
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        with_conn_split!(self.pool,
            sqlite: conn => {
                diesel::replace_into(pages::table)
                    .values(&record)
                    .execute(&mut conn)
                    .await?;
                Ok(())
            },
            postgres: conn => {
                diesel::insert_into(pages::table)
                    .values(&record)
                    .on_conflict(pages::normalized_url_group)
                    .do_update()
                    .set(&record)
                    .execute(&mut conn)
                    .await?;
                Ok(())
            }
        )
    }

    pub async fn count_all(&self) -> Result<i64, DbError> {
        use diesel::dsl::count_star;
        with_conn_split!(self.pool,
            sqlite: conn => pages::table.select(count_star()).first(&mut conn).await,
            postgres: conn => pages::table.select(count_star()).first(&mut conn).await
        )
    }

    pub async fn page(&self, source_id: Option<&str>, offset: i64, limit: i64) -> Result<Vec<PageRow>, DbError> {
        let records: Vec<PageRecord> = with_conn_split!(self.pool,
            sqlite: conn => {
                let mut q = pages::table.into_boxed();
                if let Some(sid) = source_id {
                    q = q.filter(pages::source_id.eq(sid.to_string()));
                }
                q.order(pages::updated_at.desc())
                    .offset(offset)
                    .limit(limit)
                    .load(&mut conn)
                    .await
            },
            postgres: conn => {
                let mut q = pages::table.into_boxed();
                if let Some(sid) = source_id {
                    q = q.filter(pages::source_id.eq(sid.to_string()));
                }
                q.order(pages::updated_at.desc())
                    .offset(offset)
                    .limit(limit)
                    .load(&mut conn)
                    .await
            }
        )?;
        Ok(records.into_iter().map(PageRow::from).collect())
    }
}
