//! Safety rails (spec §4.J): infra-error classification, disk-headroom
//! gate, infra-error cooldown bookkeeping, stale-job reconciliation.
//!
//! The errno classification itself lives on `HaError` (`error.rs`) so
//! every I/O boundary in the crate can reach it without depending on
//! this module; this module holds the rails that are specific to the
//! worker loop's operational posture.

use std::path::Path;

use sysinfo::Disks;
use tracing::warn;

use crate::error::HaResult;
use crate::repository::DbContext;

/// Percentage of a filesystem in use, measured against the disk that
/// contains `path` (the longest matching mount point among those
/// `sysinfo` reports). Returns `None` if no disk covers `path` (e.g. in
/// a sandboxed test environment with no real mounts enumerated).
pub fn percent_used(path: &Path) -> Option<u8> {
    let disks = Disks::new_with_refreshed_list();
    let mut best: Option<(&Path, u64, u64)> = None;

    for disk in disks.list() {
        let mount = disk.mount_point();
        if path.starts_with(mount) {
            let better = best.map(|(m, _, _)| mount.as_os_str().len() > m.as_os_str().len()).unwrap_or(true);
            if better {
                best = Some((mount, disk.total_space(), disk.available_space()));
            }
        }
    }

    best.and_then(|(_, total, available)| {
        if total == 0 {
            return None;
        }
        let used = total.saturating_sub(available);
        Some(((used as f64 / total as f64) * 100.0).round() as u8)
    })
}

/// Disk-headroom gate (spec §4.D step 1 / §4.J): true when the archive
/// filesystem is at or above `threshold_percent` used. When the disk
/// can't be resolved (no mount enumerated for `archive_root`), the gate
/// is treated as open — a missing measurement must never silently stall
/// the worker.
pub fn disk_headroom_exceeded(archive_root: &Path, threshold_percent: u8) -> bool {
    match percent_used(archive_root) {
        Some(used) => {
            let exceeded = used >= threshold_percent;
            if exceeded {
                warn!(used_percent = used, threshold_percent, "disk headroom below threshold, skipping poll iteration");
            }
            exceeded
        }
        None => false,
    }
}

/// True when a job's output directory can't be read — missing,
/// permission-denied, or a stale mount (spec §4.J "whose output
/// directory is unreadable"). A `running` job whose directory is still
/// readable is presumed to be a legitimately long crawl, not a crash,
/// and is left alone by `recover_stale_jobs`.
pub async fn output_dir_unreadable(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_err()
}

/// Crash-recovery pass (spec §4.A/§4.J): reset `running` jobs whose
/// `started_at` is older than `threshold_minutes` **and** whose output
/// directory is unreadable to `retryable`, without consuming retry
/// budget. A job past the threshold but still writing to a readable
/// output directory is a long-running crawl, not a crash, and is left
/// running. Intended to run once at worker startup, before the first
/// poll iteration.
pub async fn recover_stale_jobs(ctx: &DbContext, threshold_minutes: i64) -> HaResult<usize> {
    let candidates = ctx.jobs().stale_running_candidates(threshold_minutes, chrono::Utc::now()).await?;
    let mut recovered = 0;
    for job in candidates {
        if output_dir_unreadable(Path::new(&job.output_dir)).await {
            ctx.jobs().mark_retryable_without_retry_budget(&job.id).await?;
            recovered += 1;
        }
    }
    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobConfig, JobStatus, Source, ToolOptions};
    use crate::repository::pool::DbPool;
    use tempfile::tempdir;

    #[test]
    fn percent_used_on_nonexistent_path_is_none_or_some() {
        // No assertion on the value itself (depends on the host's real
        // mounts) — just that this never panics on a path with no
        // matching disk.
        let _ = percent_used(Path::new("/this/path/does/not/exist/anywhere"));
    }

    async fn ctx(dir: &Path) -> DbContext {
        let db_path = dir.join("test.db");
        let ctx = DbContext::new(DbPool::sqlite_from_path(&db_path), dir.to_path_buf());
        ctx.init_schema().await.unwrap();
        ctx
    }

    #[tokio::test]
    async fn recover_stale_jobs_leaves_long_crawl_with_readable_dir_running() {
        let dir = tempdir().unwrap();
        let ctx = ctx(dir.path()).await;
        let source = Source::new("hc", "Health Canada", "https://www.canada.ca");
        ctx.sources().save(&source).await.unwrap();

        let output_dir = dir.path().join("hc-job");
        std::fs::create_dir_all(&output_dir).unwrap();
        let mut job = crate::models::ArchiveJob::new(
            &source.id,
            "hc-job",
            output_dir.display().to_string(),
            JobConfig { seeds: vec!["https://www.canada.ca".to_string()], tool_options: ToolOptions::default(), passthrough_args: vec![] },
        );
        job.status = JobStatus::Running;
        job.started_at = Some(chrono::Utc::now() - chrono::Duration::minutes(120));
        ctx.jobs().insert(&job).await.unwrap();

        let recovered = recover_stale_jobs(&ctx, 60).await.unwrap();
        assert_eq!(recovered, 0, "a still-readable output dir means the crawl is long-running, not crashed");

        let reloaded = ctx.jobs().require(&job.id).await.unwrap();
        assert_eq!(reloaded.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn recover_stale_jobs_resets_job_with_unreadable_output_dir() {
        let dir = tempdir().unwrap();
        let ctx = ctx(dir.path()).await;
        let source = Source::new("hc", "Health Canada", "https://www.canada.ca");
        ctx.sources().save(&source).await.unwrap();

        // Output dir is never created on disk: unreadable, simulating a
        // lost mount or a crashed worker that never wrote anything.
        let missing_output_dir = dir.path().join("never-created");
        let mut job = crate::models::ArchiveJob::new(
            &source.id,
            "hc-job",
            missing_output_dir.display().to_string(),
            JobConfig { seeds: vec!["https://www.canada.ca".to_string()], tool_options: ToolOptions::default(), passthrough_args: vec![] },
        );
        job.status = JobStatus::Running;
        job.retry_count = 1;
        job.started_at = Some(chrono::Utc::now() - chrono::Duration::minutes(120));
        ctx.jobs().insert(&job).await.unwrap();

        let recovered = recover_stale_jobs(&ctx, 60).await.unwrap();
        assert_eq!(recovered, 1);

        let reloaded = ctx.jobs().require(&job.id).await.unwrap();
        assert_eq!(reloaded.status, JobStatus::Retryable);
        assert_eq!(reloaded.retry_count, 1, "crash recovery must never consume retry budget");
    }
}
