//! Source repository (spec §3 "Source").

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::SourceRecord;
use super::pool::{DbError, DbPool};
use super::{parse_datetime, parse_datetime_opt};
use crate::models::Source;
use crate::schema::sources;
use crate::with_conn;

impl From<SourceRecord> for Source {
    fn from(r: SourceRecord) -> Self {
        Source {
            id: r.id,
            code: r.code,
            name: r.name,
            base_url: r.base_url,
            enabled: r.enabled,
            created_at: parse_datetime(&r.created_at),
            updated_at: parse_datetime_opt(Some(r.updated_at)).unwrap_or(parse_datetime(&r.created_at)),
        }
    }
}

impl From<&Source> for SourceRecord {
    fn from(s: &Source) -> Self {
        SourceRecord {
            id: s.id.clone(),
            code: s.code.clone(),
            name: s.name.clone(),
            base_url: s.base_url.clone(),
            enabled: s.enabled,
            created_at: s.created_at.to_rfc3339(),
            updated_at: s.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct SourceRepository {
    pool: DbPool,
}

impl SourceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Source>, DbError> {
        with_conn!(self.pool, conn => {
            sources::table
                .find(id)
                .first::<SourceRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(Source::from))
        })
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<Source>, DbError> {
        with_conn!(self.pool, conn => {
            sources::table
                .filter(sources::code.eq(code))
                .first::<SourceRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(Source::from))
        })
    }

    pub async fn get_all(&self) -> Result<Vec<Source>, DbError> {
        with_conn!(self.pool, conn => {
            sources::table
                .load::<SourceRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(Source::from).collect())
        })
    }

    /// Insert or update a source, keyed by id.
    pub async fn save(&self, source: &Source) -> Result<(), DbError> {
        let record = SourceRecord::from(source);
        crate::with_conn_split!(self.pool,
            sqlite: conn => {
                diesel::replace_into(sources::table)
                    .values(&record)
                    .execute(&mut conn)
                    .await?;
                Ok(())
            },
            postgres: conn => {
                diesel::insert_into(sources::table)
                    .values(&record)
                    .on_conflict(sources::id)
                    .do_update()
                    .set(&record)
                    .execute(&mut conn)
                    .await?;
                Ok(())
            }
        )
    }

    pub async fn exists(&self, id: &str) -> Result<bool, DbError> {
        with_conn!(self.pool, conn => {
            use diesel::dsl::count_star;
            let count: i64 = sources::table
                .filter(sources::id.eq(id))
                .select(count_star())
                .first(&mut conn)
                .await?;
            Ok(count > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel_async::SimpleAsyncConnection;
    use tempfile::tempdir;

    async fn setup() -> (DbPool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = DbPool::sqlite_from_path(&db_path);
        with_conn!(pool, conn => {
            conn.batch_execute(
                "CREATE TABLE sources (
                    id TEXT PRIMARY KEY, code TEXT NOT NULL UNIQUE, name TEXT NOT NULL,
                    base_url TEXT NOT NULL, enabled INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL, updated_at TEXT NOT NULL
                )",
            )
            .await
        })
        .unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn source_crud_roundtrip() {
        let (pool, _dir) = setup().await;
        let repo = SourceRepository::new(pool);

        let source = Source::new("hc", "Health Canada", "https://www.canada.ca/en/health-canada.html");
        repo.save(&source).await.unwrap();

        assert!(repo.exists(&source.id).await.unwrap());
        let fetched = repo.get(&source.id).await.unwrap().unwrap();
        assert_eq!(fetched.code, "hc");

        let by_code = repo.get_by_code("hc").await.unwrap().unwrap();
        assert_eq!(by_code.id, source.id);

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
