//! Snapshot repository (spec §3 "Snapshot", §4.G indexing pipeline).

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::SnapshotRecord;
use super::pool::{DbError, DbPool};
use super::parse_datetime;
use crate::models::{Language, Snapshot};
use crate::schema::snapshots;
use crate::with_conn;

impl From<SnapshotRecord> for Snapshot {
    fn from(r: SnapshotRecord) -> Self {
        Snapshot {
            id: r.id,
            job_id: r.job_id,
            source_id: r.source_id,
            url: r.url,
            normalized_url_group: r.normalized_url_group,
            capture_timestamp: parse_datetime(&r.capture_timestamp),
            mime_type: r.mime_type,
            status_code: r.status_code,
            title: r.title,
            snippet: r.snippet,
            content_text: r.content_text,
            language: r.language.as_deref().map(Language::parse).unwrap_or(Language::Unknown),
            content_hash: r.content_hash,
            is_archived: r.is_archived,
            warc_path: r.warc_path,
            warc_record_id: r.warc_record_id,
            created_at: parse_datetime(&r.created_at),
        }
    }
}

impl From<&Snapshot> for SnapshotRecord {
    fn from(s: &Snapshot) -> Self {
        SnapshotRecord {
            id: s.id.clone(),
            job_id: s.job_id.clone(),
            source_id: s.source_id.clone(),
            url: s.url.clone(),
            normalized_url_group: s.normalized_url_group.clone(),
            capture_timestamp: s.capture_timestamp.to_rfc3339(),
            mime_type: s.mime_type.clone(),
            status_code: s.status_code,
            title: s.title.clone(),
            snippet: s.snippet.clone(),
            content_text: s.content_text.clone(),
            language: Some(s.language.as_str().to_string()),
            content_hash: s.content_hash.clone(),
            is_archived: s.is_archived,
            warc_path: s.warc_path.clone(),
            warc_record_id: s.warc_record_id.clone(),
            created_at: s.created_at.to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct SnapshotRepository {
    pool: DbPool,
}

impl SnapshotRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Snapshot>, DbError> {
        with_conn!(self.pool, conn => {
            snapshots::table
                .find(id)
                .first::<SnapshotRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(Snapshot::from))
        })
    }

    /// Delete all snapshots for a job (spec §3 invariant I3 / §4.G step 4).
    pub async fn delete_by_job(&self, job_id: &str) -> Result<usize, DbError> {
        with_conn!(self.pool, conn => {
            diesel::delete(snapshots::table.filter(snapshots::job_id.eq(job_id)))
                .execute(&mut conn)
                .await
        })
    }

    /// Insert a batch of snapshots in one round trip (called every
    /// `index_flush_batch_size` rows by the indexing pipeline, spec §4.G
    /// step 6).
    pub async fn insert_batch(&self, batch: &[Snapshot]) -> Result<usize, DbError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let records: Vec<SnapshotRecord> = batch.iter().map(SnapshotRecord::from).collect();
        with_conn!(self.pool, conn => {
            diesel::insert_into(snapshots::table)
                .values(&records)
                .execute(&mut conn)
                .await
        })
    }

    pub async fn count_by_job(&self, job_id: &str) -> Result<i64, DbError> {
        use diesel::dsl::count_star;
        with_conn!(self.pool, conn => {
            snapshots::table
                .filter(snapshots::job_id.eq(job_id))
                .select(count_star())
                .first(&mut conn)
                .await
        })
    }

    /// Total snapshot count across all sources (spec §6 `/api/health`,
    /// `/api/stats`).
    pub async fn count_total(&self) -> Result<i64, DbError> {
        use diesel::dsl::count_star;
        with_conn!(self.pool, conn => {
            snapshots::table.select(count_star()).first(&mut conn).await
        })
    }

    /// Per-source snapshot count and capture-timestamp range (spec §6
    /// `/api/sources` "per-source counts and capture range").
    pub async fn count_and_range_by_source(&self, source_id: &str) -> Result<(i64, Option<String>, Option<String>), DbError> {
        use diesel::dsl::{count_star, max, min};
        with_conn!(self.pool, conn => {
            snapshots::table
                .filter(snapshots::source_id.eq(source_id))
                .select((count_star(), min(snapshots::capture_timestamp), max(snapshots::capture_timestamp)))
                .first(&mut conn)
                .await
        })
    }

    /// All snapshots for a page group, ordered by capture time (ties by
    /// id ascending, per spec §4.H's tie-break).
    pub async fn list_by_group(&self, normalized_url_group: &str) -> Result<Vec<Snapshot>, DbError> {
        let records: Vec<SnapshotRecord> = with_conn!(self.pool, conn => {
            snapshots::table
                .filter(snapshots::normalized_url_group.eq(normalized_url_group))
                .order((snapshots::capture_timestamp.asc(), snapshots::id.asc()))
                .load(&mut conn)
                .await
        })?;
        Ok(records.into_iter().map(Snapshot::from).collect())
    }

    /// Distinct page groups touched by a job's snapshots, for the
    /// change-tracker hand-off after indexing (spec §4.D step 6).
    pub async fn distinct_groups_for_job(&self, job_id: &str) -> Result<Vec<String>, DbError> {
        with_conn!(self.pool, conn => {
            snapshots::table
                .filter(snapshots::job_id.eq(job_id))
                .select(snapshots::normalized_url_group)
                .distinct()
                .load(&mut conn)
                .await
        })
    }

    /// Broad, filterable candidate fetch for the search engine (spec
    /// §4.I): applies every filter that can be pushed down to SQL
    /// (source, language, status-code partition, capture-time range),
    /// capped at `limit` rows so in-memory ranking has a bounded input
    /// set regardless of corpus size.
    #[allow(clippy::too_many_arguments)]
    pub async fn search_candidates(
        &self,
        source_id: Option<&str>,
        language: Option<&str>,
        include_non_2xx: bool,
        from: Option<chrono::DateTime<chrono::Utc>>,
        to: Option<chrono::DateTime<chrono::Utc>>,
        limit: i64,
    ) -> Result<Vec<Snapshot>, DbError> {
        let records: Vec<SnapshotRecord> = with_conn!(self.pool, conn => {
            let mut q = snapshots::table.into_boxed();
            if let Some(sid) = source_id {
                q = q.filter(snapshots::source_id.eq(sid.to_string()));
            }
            if let Some(lang) = language {
                q = q.filter(snapshots::language.eq(lang.to_string()));
            }
            if !include_non_2xx {
                q = q.filter(
                    snapshots::status_code
                        .is_null()
                        .or(snapshots::status_code.ge(200).and(snapshots::status_code.lt(300))),
                );
            }
            if let Some(from) = from {
                q = q.filter(snapshots::capture_timestamp.ge(from.to_rfc3339()));
            }
            if let Some(to) = to {
                q = q.filter(snapshots::capture_timestamp.le(to.to_rfc3339()));
            }
            q.order((snapshots::capture_timestamp.desc(), snapshots::id.desc()))
                .limit(limit)
                .load(&mut conn)
                .await
        })?;
        Ok(records.into_iter().map(Snapshot::from).collect())
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
        with_conn!(pool, conn => {
            conn.batch_execute(
                "CREATE TABLE snapshots (
                    id TEXT PRIMARY KEY, job_id TEXT NOT NULL, source_id TEXT NOT NULL, url TEXT NOT NULL,
                    normalized_url_group TEXT NOT NULL, capture_timestamp TEXT NOT NULL, mime_type TEXT,
                    status_code INTEGER, title TEXT, snippet TEXT, content_text TEXT, language TEXT,
                    content_hash TEXT NOT NULL, is_archived INTEGER, warc_path TEXT NOT NULL,
                    warc_record_id TEXT, created_at TEXT NOT NULL
                )",
            )
            .await
        })
        .unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn insert_batch_then_delete_by_job_is_idempotent() {
        let (pool, _dir) = setup().await;
        let repo = SnapshotRepository::new(pool);

        let snap = Snapshot::new(
            "job-1",
            "source-1",
            "https://www.canada.ca/en/page.html",
            "canada.ca/en/page.html",
            Utc::now(),
            "/archive/hc/job-1/warcs/a.warc.gz",
            "deadbeef",
        );

        repo.insert_batch(&[snap.clone()]).await.unwrap();
        assert_eq!(repo.count_by_job("job-1").await.unwrap(), 1);

        // Reindexing deletes then reinserts: count must come back to 1, not 2.
        repo.delete_by_job("job-1").await.unwrap();
        repo.insert_batch(&[snap]).await.unwrap();
        assert_eq!(repo.count_by_job("job-1").await.unwrap(), 1);
    }
}
