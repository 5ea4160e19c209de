//! Indexing pipeline (spec §4.G): turns a completed job's WARC captures
//! into `Snapshot` rows.
//!
//! Grounded on the teacher's `discovery`/ingest modules for the
//! "walk discovered files, extract, batch-insert" shape, generalized
//! from document ingestion to WARC-record ingestion using
//! `warc_ingest`/`extract` built earlier in this pass.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{HaError, HaResult};
use crate::extract;
use crate::models::{ArchiveJob, JobStatus, Snapshot};
use crate::repository::{DbContext, PageRepository, SnapshotRepository};
use crate::urlnorm;
use crate::warc_ingest::{discover_warcs, WarcHtmlReader};

/// Indexable job statuses (spec §4.G step 1): a job must have finished
/// crawling, or already have gone through indexing once, before it can
/// be (re)indexed.
fn is_indexable(status: JobStatus) -> bool {
    matches!(status, JobStatus::Completed | JobStatus::IndexFailed | JobStatus::Indexed)
}

/// Runs the indexing pipeline for one job (spec §4.G).
///
/// Idempotent: reindexing first deletes all snapshots for the job
/// (invariant I3) before inserting the new set.
pub async fn index_job(ctx: &DbContext, flush_batch_size: usize, job_id: &str) -> HaResult<ArchiveJob> {
    let jobs = ctx.jobs();
    let snapshots = ctx.snapshots();
    let pages = ctx.pages();

    let mut job = jobs.require(job_id).await?;

    if !is_indexable(job.status) {
        return Err(HaError::Validation(format!(
            "job {job_id} is not indexable from status {:?}",
            job.status
        )));
    }

    let output_dir = Path::new(&job.output_dir);
    if tokio::fs::metadata(output_dir).await.is_err() {
        return Err(HaError::StorageUnavailable(format!(
            "job {job_id} output_dir {} is not readable",
            output_dir.display()
        )));
    }

    let warcs = discover_warcs(output_dir).await?;
    job.warc_file_count = warcs.len() as i32;

    if warcs.is_empty() {
        job.status = JobStatus::IndexFailed;
        job.updated_at = chrono::Utc::now();
        jobs.update(&job).await?;
        return Ok(job);
    }

    snapshots.delete_by_job(job_id).await.map_err(HaError::from)?;

    job.status = JobStatus::Indexing;
    job.indexed_page_count = 0;
    job.updated_at = chrono::Utc::now();
    jobs.update(&job).await?;

    let mut sorted_warcs = warcs;
    sorted_warcs.sort();

    let mut batch: Vec<Snapshot> = Vec::with_capacity(flush_batch_size);
    let mut total_indexed: i64 = 0;
    // Best-effort pages_crawled/total/failed (spec §3 "Counts"): every
    // HTML response record the reader yields is an extraction attempt;
    // one that doesn't make it into the batch below is a per-record
    // failure (spec §4.G step 6 "log and continue on per-record
    // exceptions"), not a job-ending one.
    let mut pages_total: i32 = 0;
    let mut pages_failed: i32 = 0;

    for warc_path in &sorted_warcs {
        let mut reader = match WarcHtmlReader::open(warc_path) {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %warc_path.display(), error = %e, "skipping unreadable WARC file during indexing");
                continue;
            }
        };

        loop {
            let record = match reader.next_html_record() {
                Ok(Some(r)) => r,
                Ok(None) => break,
                Err(e) => {
                    warn!(path = %warc_path.display(), error = %e, "stopping read of WARC file after record error");
                    break;
                }
            };

            pages_total += 1;

            let extracted = extract::extract(&record.body, &record.headers);
            let normalized_url_group = urlnorm::normalize(&record.url);

            let mut snapshot = Snapshot::new(
                job_id,
                &job.source_id,
                &record.url,
                normalized_url_group,
                record.capture_timestamp,
                record.warc_path.display().to_string(),
                extracted.content_hash,
            );
            snapshot.mime_type = record.header("content-type").map(|s| s.to_string());
            snapshot.status_code = record.status_code;
            snapshot.title = extracted.title;
            snapshot.snippet = extracted.snippet;
            snapshot.content_text = Some(extracted.content_text);
            snapshot.language = extracted.language;
            snapshot.is_archived = extracted.is_archived;
            snapshot.warc_record_id = Some(record.warc_record_id);

            if snapshot.content_text.as_deref().unwrap_or("").is_empty() && snapshot.title.is_none() {
                // Extraction fell all the way back to empty fields
                // (spec §4.F "fall back to best-effort empty fields and
                // log a warning") — the record is still stored (it's
                // not a crawl failure) but counts against pages_failed.
                pages_failed += 1;
                warn!(url = %record.url, "extraction produced no title or content, counting as a page failure");
            }

            batch.push(snapshot);
            total_indexed += 1;

            if batch.len() >= flush_batch_size {
                snapshots.insert_batch(&batch).await.map_err(HaError::from)?;
                batch.clear();
            }
        }
    }

    if !batch.is_empty() {
        snapshots.insert_batch(&batch).await.map_err(HaError::from)?;
    }

    job.indexed_page_count = total_indexed as i32;
    job.pages_total = Some(pages_total);
    job.pages_crawled = Some(pages_total - pages_failed);
    job.pages_failed = Some(pages_failed);
    job.status = JobStatus::Indexed;
    job.updated_at = chrono::Utc::now();
    jobs.update(&job).await?;

    refresh_pages_for_job(&snapshots, &pages, job_id).await?;

    info!(job_id, indexed = total_indexed, warcs = sorted_warcs.len(), "job indexed");

    Ok(job)
}

/// Rebuilds the materialized `pages` rows for every group touched by
/// this job's snapshots (spec §4.G step 8 fast-path support).
async fn refresh_pages_for_job(snapshots: &SnapshotRepository, pages: &PageRepository, job_id: &str) -> HaResult<()> {
    let groups = snapshots.distinct_groups_for_job(job_id).await.map_err(HaError::from)?;
    for group in groups {
        let group_snapshots = snapshots.list_by_group(&group).await.map_err(HaError::from)?;
        let Some(latest) = group_snapshots.last() else {
            continue;
        };
        pages
            .refresh_group(&group, &latest.id, &latest.source_id, group_snapshots.len() as i32)
            .await
            .map_err(HaError::from)?;
    }
    Ok(())
}
