//! PageSignal repository (spec §3 "PageSignal", used as a ranking tie-break).

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::PageSignalRecord;
use super::parse_datetime;
use super::pool::{DbError, DbPool};
use crate::models::PageSignal;
use crate::schema::page_signals;
use crate::with_conn_split;

impl From<PageSignalRecord> for PageSignal {
    fn from(r: PageSignalRecord) -> Self {
        PageSignal {
            normalized_url_group: r.normalized_url_group,
            inlink_count: r.inlink_count,
            updated_at: parse_datetime(&r.updated_at),
        }
    }
}

impl From<&PageSignal> for PageSignalRecord {
    fn from(s: &PageSignal) -> Self {
        PageSignalRecord {
            normalized_url_group: s.normalized_url_group.clone(),
            inlink_count: s.inlink_count,
            updated_at: s.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct PageSignalRepository {
    pool: DbPool,
}

impl PageSignalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, normalized_url_group: &str) -> Result<Option<PageSignal>, DbError> {
        with_conn_split!(self.pool,
            sqlite: conn => {
                page_signals::table
                    .find(normalized_url_group)
                    .first::<PageSignalRecord>(&mut conn)
                    .await
                    .optional()
                    .map(|opt| opt.map(PageSignal::from))
            },
            postgres: conn => {
                page_signals::table
                    .find(normalized_url_group)
                    .first::<PageSignalRecord>(&mut conn)
                    .await
                    .optional()
                    .map(|opt| opt.map(PageSignal::from))
            }
        )
    }

    /// Fetch every known signal as a lookup map, used once per search
    /// request so ranking can apply the authority bonus in memory
    /// instead of joining per-candidate (spec §4.I).
    pub async fn all_as_map(&self) -> Result<std::collections::HashMap<String, i32>, DbError> {
        let records: Vec<PageSignalRecord> = with_conn_split!(self.pool,
            sqlite: conn => page_signals::table.load(&mut conn).await,
            postgres: conn => page_signals::table.load(&mut conn).await
        )?;
        Ok(records
            .into_iter()
            .map(|r| (r.normalized_url_group, r.inlink_count))
            .collect())
    }

    /// Insert or update a signal, keyed by `normalized_url_group`.
    pub async fn upsert(&self, signal: &PageSignal) -> Result<(), DbError> {
        let record = PageSignalRecord::from(signal);
        with_conn_split!(self.pool,
            sqlite: conn => {
                diesel::replace_into(page_signals::table)
                    .values(&record)
                    .execute(&mut conn)
                    .await?;
                Ok(())
            },
            postgres: conn => {
                diesel::insert_into(page_signals::table)
                    .values(&record)
                    .on_conflict(page_signals::normalized_url_group)
                    .do_update()
                    .set(&record)
                    .execute(&mut conn)
                    .await?;
                Ok(())
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use diesel_async::SimpleAsyncConnection;
    use tempfile::tempdir;

    async fn setup() -> (DbPool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = DbPool::sqlite_from_path(&db_path);
        crate::with_conn!(pool, conn => {
            conn.batch_execute(
                "CREATE TABLE page_signals (
                    normalized_url_group TEXT PRIMARY KEY,
                    inlink_count INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL
                )",
            )
            .await
        })
        .unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn upsert_then_read_as_map() {
        let (pool, _dir) = setup().await;
        let repo = PageSignalRepository::new(pool);

        let signal = PageSignal {
            normalized_url_group: "canada.ca/en/health-canada.html".to_string(),
            inlink_count: 12,
            updated_at: Utc::now(),
        };
        repo.upsert(&signal).await.unwrap();

        let map = repo.all_as_map().await.unwrap();
        assert_eq!(map.get("canada.ca/en/health-canada.html"), Some(&12));

        let mut updated = signal.clone();
        updated.inlink_count = 20;
        repo.upsert(&updated).await.unwrap();
        let fetched = repo.get(&signal.normalized_url_group).await.unwrap().unwrap();
        assert_eq!(fetched.inlink_count, 20);
    }
}
