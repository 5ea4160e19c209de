//! Worker loop (spec §4.D): single cooperative loop that selects
//! eligible jobs in FIFO-by-queue-time order, runs them through
//! crawl → index → change-track, and sleeps between polls.
//!
//! Grounded on the teacher's `cli run` command-dispatch shape
//! (`cli/commands.rs`) for the overall "load settings, construct
//! context, loop" structure; the polling/cooldown logic itself has no
//! teacher analog and is built directly from spec §4.D using the same
//! `tokio::time::sleep` idiom the teacher uses elsewhere for timed
//! waits.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::{debug, error, info, info_span, Instrument};

use crate::change_tracker;
use crate::config::Settings;
use crate::error::HaResult;
use crate::models::{CrawlerStatus, JobStatus};
use crate::repository::DbContext;
use crate::runner;
use crate::safety;

/// One full iteration of the worker loop (spec §4.D steps 1-6), split
/// out from the sleeping loop so tests can drive a single pass without
/// waiting on the poll interval.
pub async fn run_once(ctx: &DbContext, crawler_bin: &Path, settings: &Settings) -> HaResult<bool> {
    if safety::disk_headroom_exceeded(ctx.archive_root(), settings.disk_headroom_threshold_percent) {
        return Ok(false);
    }

    let Some(job) = ctx
        .jobs()
        .select_next_eligible(settings.infra_error_cooldown_minutes, chrono::Utc::now())
        .await?
    else {
        debug!("no eligible job this poll");
        return Ok(false);
    };

    let span = info_span!("worker_job", job_id = %job.id, source_id = %job.source_id);
    async {
        info!("executing crawl");
        if let Err(e) = runner::run_job(ctx, crawler_bin, &job.id).await {
            error!(error = %e, "crawl run returned an error (state already finalized by the runner)");
        }

        let mut reloaded = ctx.jobs().require(&job.id).await?;

        // Retry policy (spec §4.D step 4): a true crawl failure burns
        // retry budget up to the cap; an infra error leaves the job
        // retryable without consuming it (invariant I4).
        match reloaded.crawler_status {
            Some(CrawlerStatus::Failed) => {
                if reloaded.retry_count < settings.max_retries {
                    reloaded.status = JobStatus::Retryable;
                    reloaded.retry_count += 1;
                    reloaded.updated_at = chrono::Utc::now();
                    ctx.jobs().update(&reloaded).await?;
                } else {
                    info!(retry_count = reloaded.retry_count, "retry budget exhausted, leaving job failed");
                }
            }
            Some(CrawlerStatus::InfraError) => {
                // Already left `retryable` by the runner; nothing to do.
            }
            Some(CrawlerStatus::Success) => {
                info!("indexing job after successful crawl");
                match crate::index::index_job(ctx, settings.index_flush_batch_size, &job.id).await {
                    Ok(indexed) => {
                        let groups = ctx
                            .snapshots()
                            .distinct_groups_for_job(&indexed.id)
                            .await
                            .map_err(crate::error::HaError::from)?;
                        let tracked = change_tracker::track_groups(
                            &ctx.snapshots(),
                            &ctx.changes(),
                            &groups,
                            settings.change_tracker_batch_cap,
                        )
                        .await?;
                        info!(indexed = indexed.indexed_page_count, changes = tracked, "index and change-track complete");
                    }
                    Err(e) => {
                        error!(error = %e, "indexing failed");
                    }
                }
            }
            None => {}
        }

        Ok::<(), crate::error::HaError>(())
    }
    .instrument(span)
    .await?;

    Ok(true)
}

/// Runs the worker loop until `shutdown` is set to `true`. On shutdown,
/// the current iteration (including an in-flight crawl subprocess) is
/// allowed to finish before the loop returns — no mid-crawl abort is
/// issued (spec §4.D "Cancellation").
pub async fn run_loop(ctx: DbContext, crawler_bin: PathBuf, settings: Settings, mut shutdown: watch::Receiver<bool>) {
    info!(
        poll_interval_s = settings.worker_poll_interval_seconds,
        "starting worker loop"
    );

    match safety::recover_stale_jobs(&ctx, settings.stale_job_threshold_minutes).await {
        Ok(n) if n > 0 => info!(recovered = n, "reset stale running jobs to retryable at startup"),
        Ok(_) => {}
        Err(e) => error!(error = %e, "stale-job recovery failed at startup"),
    }

    loop {
        if *shutdown.borrow() {
            info!("shutdown signal received, stopping worker loop");
            break;
        }

        if let Err(e) = run_once(&ctx, &crawler_bin, &settings).await {
            error!(error = %e, "worker iteration failed");
        }

        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(settings.worker_poll_interval_seconds)) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("shutdown signal received during sleep, stopping worker loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArchiveJob, JobConfig, Source, ToolOptions};
    use crate::repository::DbPool;
    use tempfile::tempdir;

    fn ctx(dir: &Path) -> DbContext {
        let db_path = dir.join("test.db");
        DbContext::new(DbPool::sqlite_from_path(&db_path), dir.to_path_buf())
    }

    #[tokio::test]
    async fn run_once_returns_false_when_queue_empty() {
        let dir = tempdir().unwrap();
        let ctx = ctx(dir.path());
        ctx.init_schema().await.unwrap();
        let settings = Settings::for_test(dir.path());

        let ran = run_once(&ctx, Path::new("/usr/bin/true"), &settings).await.unwrap();
        assert!(!ran);
    }

    #[tokio::test]
    async fn run_once_indexes_after_successful_crawl() {
        let dir = tempdir().unwrap();
        let ctx = ctx(dir.path());
        ctx.init_schema().await.unwrap();
        let mut settings = Settings::for_test(dir.path());
        settings.infra_error_cooldown_minutes = 0;

        let source = Source::new("hc", "Health Canada", "https://www.canada.ca");
        ctx.sources().save(&source).await.unwrap();

        let output_dir = dir.path().join("hc-job");
        let job = ArchiveJob::new(
            &source.id,
            "hc-job",
            output_dir.display().to_string(),
            JobConfig {
                seeds: vec!["https://www.canada.ca/en/health-canada.html".to_string()],
                tool_options: ToolOptions::default(),
                passthrough_args: vec![],
            },
        );
        ctx.jobs().insert(&job).await.unwrap();

        let bin = Path::new("/usr/bin/true");
        if !bin.exists() {
            return;
        }
        let ran = run_once(&ctx, bin, &settings).await.unwrap();
        assert!(ran);

        let reloaded = ctx.jobs().require(&job.id).await.unwrap();
        // No WARCs produced by /usr/bin/true, so indexing finds none
        // and the job lands on index_failed rather than indexed.
        assert_eq!(reloaded.status, JobStatus::IndexFailed);
    }

    #[tokio::test]
    async fn run_once_retries_failed_crawl_without_exhausting_budget() {
        let dir = tempdir().unwrap();
        let ctx = ctx(dir.path());
        ctx.init_schema().await.unwrap();
        let mut settings = Settings::for_test(dir.path());
        settings.infra_error_cooldown_minutes = 0;

        let source = Source::new("hc", "Health Canada", "https://www.canada.ca");
        ctx.sources().save(&source).await.unwrap();

        let output_dir = dir.path().join("hc-job-fail");
        let job = ArchiveJob::new(
            &source.id,
            "hc-job-fail",
            output_dir.display().to_string(),
            JobConfig {
                seeds: vec!["https://www.canada.ca/en/health-canada.html".to_string()],
                tool_options: ToolOptions::default(),
                passthrough_args: vec![],
            },
        );
        ctx.jobs().insert(&job).await.unwrap();

        let bin = Path::new("/usr/bin/false");
        if !bin.exists() {
            return;
        }
        run_once(&ctx, bin, &settings).await.unwrap();

        let reloaded = ctx.jobs().require(&job.id).await.unwrap();
        assert_eq!(reloaded.status, JobStatus::Retryable);
        assert_eq!(reloaded.retry_count, 1);
    }
}
