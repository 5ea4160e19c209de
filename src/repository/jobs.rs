//! Job repository (spec §3 "ArchiveJob", §4.A/§4.C/§4.D transitions).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::ArchiveJobRecord;
use super::pool::{DbError, DbPool};
use super::{parse_datetime, parse_datetime_opt};
use crate::error::{HaError, HaResult};
use crate::models::{ArchiveJob, CleanupStatus, CrawlerStatus, JobConfig, JobStatus};
use crate::schema::archive_jobs;
use crate::with_conn;

impl From<ArchiveJobRecord> for ArchiveJob {
    fn from(r: ArchiveJobRecord) -> Self {
        let config = JobConfig {
            seeds: serde_json::from_str(&r.seeds).unwrap_or_default(),
            tool_options: serde_json::from_str(&r.tool_options).unwrap_or_default(),
            passthrough_args: serde_json::from_str(&r.passthrough_args).unwrap_or_default(),
        };

        ArchiveJob {
            id: r.id,
            source_id: r.source_id,
            name: r.name,
            output_dir: r.output_dir,
            status: JobStatus::parse(&r.status).unwrap_or(JobStatus::Failed),
            queued_at: parse_datetime(&r.queued_at),
            started_at: parse_datetime_opt(r.started_at),
            finished_at: parse_datetime_opt(r.finished_at),
            created_at: parse_datetime(&r.created_at),
            updated_at: parse_datetime(&r.updated_at),
            retry_count: r.retry_count,
            config,
            crawler_exit_code: r.crawler_exit_code,
            crawler_status: r.crawler_status.as_deref().and_then(CrawlerStatus::parse),
            crawler_status_updated_at: parse_datetime_opt(r.crawler_status_updated_at),
            crawler_stage: r.crawler_stage,
            last_stats_json: r.last_stats_json,
            combined_log_path: r.combined_log_path,
            state_file_path: r.state_file_path,
            warc_file_count: r.warc_file_count,
            indexed_page_count: r.indexed_page_count,
            pages_crawled: r.pages_crawled,
            pages_total: r.pages_total,
            pages_failed: r.pages_failed,
            cleanup_status: CleanupStatus::parse(&r.cleanup_status),
            cleaned_at: parse_datetime_opt(r.cleaned_at),
        }
    }
}

impl TryFrom<&ArchiveJob> for ArchiveJobRecord {
    type Error = serde_json::Error;

    fn try_from(j: &ArchiveJob) -> Result<Self, Self::Error> {
        Ok(ArchiveJobRecord {
            id: j.id.clone(),
            source_id: j.source_id.clone(),
            name: j.name.clone(),
            output_dir: j.output_dir.clone(),
            status: j.status.as_str().to_string(),
            queued_at: j.queued_at.to_rfc3339(),
            started_at: j.started_at.map(|t| t.to_rfc3339()),
            finished_at: j.finished_at.map(|t| t.to_rfc3339()),
            created_at: j.created_at.to_rfc3339(),
            updated_at: j.updated_at.to_rfc3339(),
            retry_count: j.retry_count,
            seeds: serde_json::to_string(&j.config.seeds)?,
            tool_options: serde_json::to_string(&j.config.tool_options)?,
            passthrough_args: serde_json::to_string(&j.config.passthrough_args)?,
            crawler_exit_code: j.crawler_exit_code,
            crawler_status: j.crawler_status.map(|s| s.as_str().to_string()),
            crawler_status_updated_at: j.crawler_status_updated_at.map(|t| t.to_rfc3339()),
            crawler_stage: j.crawler_stage.clone(),
            last_stats_json: j.last_stats_json.clone(),
            combined_log_path: j.combined_log_path.clone(),
            state_file_path: j.state_file_path.clone(),
            warc_file_count: j.warc_file_count,
            indexed_page_count: j.indexed_page_count,
            pages_crawled: j.pages_crawled,
            pages_total: j.pages_total,
            pages_failed: j.pages_failed,
            cleanup_status: j.cleanup_status.as_str().to_string(),
            cleaned_at: j.cleaned_at.map(|t| t.to_rfc3339()),
        })
    }
}

#[derive(Clone)]
pub struct JobRepository {
    pool: DbPool,
}

impl JobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> HaResult<Option<ArchiveJob>> {
        let record = with_conn!(self.pool, conn => {
            archive_jobs::table
                .find(id)
                .first::<ArchiveJobRecord>(&mut conn)
                .await
                .optional()
        })?;
        Ok(record.map(ArchiveJob::from))
    }

    pub async fn require(&self, id: &str) -> HaResult<ArchiveJob> {
        self.get(id)
            .await?
            .ok_or_else(|| HaError::NotFound(format!("job {id} not found")))
    }

    pub async fn insert(&self, job: &ArchiveJob) -> HaResult<()> {
        let record = ArchiveJobRecord::try_from(job)?;
        with_conn!(self.pool, conn => {
            diesel::insert_into(archive_jobs::table)
                .values(&record)
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    /// Persist a full job row (used for every status transition — see
    /// the `recover-stale-jobs`/retry-policy/runner writers below, all
    /// of which reload-mutate-save so each transition is a single
    /// row-level write, matching spec §4.A's atomicity requirement).
    pub async fn update(&self, job: &ArchiveJob) -> HaResult<()> {
        let record = ArchiveJobRecord::try_from(job)?;
        with_conn!(self.pool, conn => {
            diesel::update(archive_jobs::table.find(&job.id))
                .set(&record)
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn list_by_source(&self, source_id: &str) -> HaResult<Vec<ArchiveJob>> {
        let records: Vec<ArchiveJobRecord> = with_conn!(self.pool, conn => {
            archive_jobs::table
                .filter(archive_jobs::source_id.eq(source_id))
                .order(archive_jobs::queued_at.desc())
                .load(&mut conn)
                .await
        })?;
        Ok(records.into_iter().map(ArchiveJob::from).collect())
    }

    pub async fn list_by_status(&self, status: JobStatus, limit: i64) -> HaResult<Vec<ArchiveJob>> {
        let records: Vec<ArchiveJobRecord> = with_conn!(self.pool, conn => {
            archive_jobs::table
                .filter(archive_jobs::status.eq(status.as_str()))
                .order(archive_jobs::queued_at.desc())
                .limit(limit)
                .load(&mut conn)
                .await
        })?;
        Ok(records.into_iter().map(ArchiveJob::from).collect())
    }

    pub async fn status_counts(&self) -> HaResult<Vec<(String, i64)>> {
        use diesel::dsl::count_star;
        let rows: Vec<(String, i64)> = with_conn!(self.pool, conn => {
            archive_jobs::table
                .group_by(archive_jobs::status)
                .select((archive_jobs::status, count_star()))
                .load(&mut conn)
                .await
        })?;
        Ok(rows)
    }

    /// Select the next eligible job per spec §4.D step 2: smallest
    /// `queued_at` (ties broken by `created_at`) among `queued`/
    /// `retryable` jobs whose most recent infra-error update, if any,
    /// is older than `cooldown_minutes`.
    pub async fn select_next_eligible(&self, cooldown_minutes: i64, now: DateTime<Utc>) -> HaResult<Option<ArchiveJob>> {
        let records: Vec<ArchiveJobRecord> = with_conn!(self.pool, conn => {
            archive_jobs::table
                .filter(
                    archive_jobs::status
                        .eq(JobStatus::Queued.as_str())
                        .or(archive_jobs::status.eq(JobStatus::Retryable.as_str())),
                )
                .order((archive_jobs::queued_at.asc(), archive_jobs::created_at.asc()))
                .load(&mut conn)
                .await
        })?;

        let cooldown = chrono::Duration::minutes(cooldown_minutes);
        for record in records {
            let job = ArchiveJob::from(record);
            let in_cooldown = job.crawler_status == Some(CrawlerStatus::InfraError)
                && job
                    .crawler_status_updated_at
                    .map(|ts| now - ts < cooldown)
                    .unwrap_or(false);
            if !in_cooldown {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    /// `running` jobs whose `started_at` is older than
    /// `threshold_minutes` (spec §4.A/§4.J's age half of the crash-
    /// recovery condition). The caller additionally checks each
    /// candidate's output directory before resetting it — this method
    /// does no filesystem I/O of its own.
    pub async fn stale_running_candidates(&self, threshold_minutes: i64, now: DateTime<Utc>) -> HaResult<Vec<ArchiveJob>> {
        let running = self.list_by_status(JobStatus::Running, 1000).await?;
        let threshold = chrono::Duration::minutes(threshold_minutes);
        Ok(running
            .into_iter()
            .filter(|job| job.started_at.map(|started| now - started > threshold).unwrap_or(true))
            .collect())
    }

    /// Resets a single job to `retryable` without incrementing
    /// `retry_count` (spec §4.A/§4.J crash recovery).
    pub async fn mark_retryable_without_retry_budget(&self, job_id: &str) -> HaResult<()> {
        let mut job = self.require(job_id).await?;
        job.status = JobStatus::Retryable;
        job.updated_at = Utc::now();
        self.update(&job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Source, ToolOptions};
    use diesel_async::SimpleAsyncConnection;
    use tempfile::tempdir;

    async fn setup() -> (DbPool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = DbPool::sqlite_from_path(&db_path);
        with_conn!(pool, conn => {
            conn.batch_execute(
                "CREATE TABLE archive_jobs (
                    id TEXT PRIMARY KEY, source_id TEXT NOT NULL, name TEXT NOT NULL,
                    output_dir TEXT NOT NULL, status TEXT NOT NULL, queued_at TEXT NOT NULL,
                    started_at TEXT, finished_at TEXT, created_at TEXT NOT NULL, updated_at TEXT NOT NULL,
                    retry_count INTEGER NOT NULL DEFAULT 0, seeds TEXT NOT NULL, tool_options TEXT NOT NULL,
                    passthrough_args TEXT NOT NULL, crawler_exit_code INTEGER, crawler_status TEXT,
                    crawler_status_updated_at TEXT, crawler_stage TEXT, last_stats_json TEXT,
                    combined_log_path TEXT, state_file_path TEXT, warc_file_count INTEGER NOT NULL DEFAULT 0,
                    indexed_page_count INTEGER NOT NULL DEFAULT 0, pages_crawled INTEGER, pages_total INTEGER,
                    pages_failed INTEGER, cleanup_status TEXT NOT NULL DEFAULT 'none', cleaned_at TEXT
                )",
            )
            .await
        })
        .unwrap();
        (pool, dir)
    }

    fn sample_job(source_id: &str) -> ArchiveJob {
        ArchiveJob::new(
            source_id,
            "hc-20260101",
            "/archive/hc/20260101T000000Z__hc-20260101",
            JobConfig {
                seeds: vec!["https://www.canada.ca/en/health-canada.html".to_string()],
                tool_options: ToolOptions::default(),
                passthrough_args: vec![],
            },
        )
    }

    #[tokio::test]
    async fn insert_and_fetch_job() {
        let (pool, _dir) = setup().await;
        let repo = JobRepository::new(pool);
        let source = Source::new("hc", "Health Canada", "https://www.canada.ca");
        let job = sample_job(&source.id);

        repo.insert(&job).await.unwrap();
        let fetched = repo.require(&job.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Queued);
        assert_eq!(fetched.config.seeds.len(), 1);
    }

    #[tokio::test]
    async fn selection_skips_infra_error_in_cooldown() {
        let (pool, _dir) = setup().await;
        let repo = JobRepository::new(pool);
        let source = Source::new("hc", "Health Canada", "https://www.canada.ca");

        let mut job = sample_job(&source.id);
        job.status = JobStatus::Retryable;
        job.crawler_status = Some(CrawlerStatus::InfraError);
        job.crawler_status_updated_at = Some(Utc::now());
        repo.insert(&job).await.unwrap();

        let selected = repo.select_next_eligible(10, Utc::now()).await.unwrap();
        assert!(selected.is_none());

        let selected_later = repo
            .select_next_eligible(10, Utc::now() + chrono::Duration::minutes(11))
            .await
            .unwrap();
        assert_eq!(selected_later.unwrap().id, job.id);
    }

    #[tokio::test]
    async fn stale_running_candidates_filters_by_started_at_age_only() {
        let (pool, _dir) = setup().await;
        let repo = JobRepository::new(pool);
        let source = Source::new("hc", "Health Canada", "https://www.canada.ca");

        let mut stale = sample_job(&source.id);
        stale.status = JobStatus::Running;
        stale.started_at = Some(Utc::now() - chrono::Duration::minutes(120));
        repo.insert(&stale).await.unwrap();

        let mut fresh = sample_job(&source.id);
        fresh.status = JobStatus::Running;
        fresh.started_at = Some(Utc::now());
        repo.insert(&fresh).await.unwrap();

        let candidates = repo.stale_running_candidates(60, Utc::now()).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, stale.id);
    }

    #[tokio::test]
    async fn mark_retryable_without_retry_budget_resets_status_only() {
        let (pool, _dir) = setup().await;
        let repo = JobRepository::new(pool);
        let source = Source::new("hc", "Health Canada", "https://www.canada.ca");

        let mut job = sample_job(&source.id);
        job.status = JobStatus::Running;
        job.retry_count = 2;
        repo.insert(&job).await.unwrap();

        repo.mark_retryable_without_retry_budget(&job.id).await.unwrap();

        let reloaded = repo.require(&job.id).await.unwrap();
        assert_eq!(reloaded.status, JobStatus::Retryable);
        assert_eq!(reloaded.retry_count, 2, "crash recovery must never consume retry budget");
    }
}
