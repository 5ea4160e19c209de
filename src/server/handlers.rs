//! HTTP handlers (spec §6).
//!
//! Grounded on the teacher's `server/handlers.rs` convention of a typed
//! params struct deserialized via axum's `Query<T>` extractor, and on
//! its `AppState`-via-`State<T>` handler signatures; generalized from
//! document-browsing responses to the JSON API spec §6 names.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{HaError, HaResult};
use crate::models::{JobStatus, Snapshot};
use crate::search::{self, SearchParams, SearchResponse, Sort, View};
use crate::warc_ingest::WarcHtmlReader;

use super::state::AppState;

fn parse_date_bound(raw: &Option<String>, label: &str) -> HaResult<Option<DateTime<Utc>>> {
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| HaError::Validation(format!("invalid {label}: {s}"))),
    }
}

// ---------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------

pub async fn health(State(state): State<AppState>) -> Response {
    match health_checks(&state).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => {
            let body = json!({"status": "error", "error": e.to_string()});
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

async fn health_checks(state: &AppState) -> HaResult<serde_json::Value> {
    let counts = state.ctx.jobs().status_counts().await?;
    let jobs_by_status: HashMap<String, i64> = counts.into_iter().collect();
    let total_snapshots = state.ctx.snapshots().count_total().await?;

    Ok(json!({
        "status": "ok",
        "checks": {
            "db": "ok",
            "jobs": jobs_by_status,
            "snapshots": { "total": total_snapshots },
        }
    }))
}

// ---------------------------------------------------------------------
// GET /api/stats
// ---------------------------------------------------------------------

pub async fn stats(State(state): State<AppState>) -> HaResult<Json<serde_json::Value>> {
    if let Some(cached) = state.stats_cache.get() {
        return Ok(Json(cached));
    }

    let sources = state.ctx.sources().get_all().await?;
    let total_snapshots = state.ctx.snapshots().count_total().await?;
    let total_pages = state.ctx.pages().count_all().await?;
    let job_status_counts: HashMap<String, i64> = state.ctx.jobs().status_counts().await?.into_iter().collect();

    let body = json!({
        "sources": sources.len(),
        "totalSnapshots": total_snapshots,
        "totalPages": total_pages,
        "jobsByStatus": job_status_counts,
    });
    state.stats_cache.set(body.clone());
    Ok(Json(body))
}

// ---------------------------------------------------------------------
// GET /api/sources
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SourceSummary {
    code: String,
    name: String,
    #[serde(rename = "baseUrl")]
    base_url: String,
    enabled: bool,
    #[serde(rename = "snapshotCount")]
    snapshot_count: i64,
    #[serde(rename = "earliestCapture")]
    earliest_capture: Option<String>,
    #[serde(rename = "latestCapture")]
    latest_capture: Option<String>,
}

pub async fn sources(State(state): State<AppState>) -> HaResult<Json<Vec<SourceSummary>>> {
    let rows = state.ctx.sources().get_all().await?;
    let mut out = Vec::with_capacity(rows.len());
    for source in rows {
        let (count, earliest, latest) = state.ctx.snapshots().count_and_range_by_source(&source.id).await?;
        out.push(SourceSummary {
            code: source.code,
            name: source.name,
            base_url: source.base_url,
            enabled: source.enabled,
            snapshot_count: count,
            earliest_capture: earliest,
            latest_capture: latest,
        });
    }
    Ok(Json(out))
}

// ---------------------------------------------------------------------
// GET /api/search
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
    source: Option<String>,
    sort: Option<String>,
    view: Option<String>,
    #[serde(rename = "includeNon2xx")]
    include_non_2xx: Option<bool>,
    from: Option<String>,
    to: Option<String>,
    language: Option<String>,
    page: Option<i64>,
    #[serde(rename = "pageSize")]
    page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SnapshotSummary {
    id: String,
    title: Option<String>,
    #[serde(rename = "sourceCode")]
    source_code: String,
    #[serde(rename = "sourceName")]
    source_name: String,
    language: String,
    #[serde(rename = "captureDate")]
    capture_date: String,
    #[serde(rename = "originalUrl")]
    original_url: String,
    snippet: Option<String>,
    #[serde(rename = "rawSnapshotUrl")]
    raw_snapshot_url: String,
    #[serde(rename = "pageSnapshotsCount")]
    page_snapshots_count: Option<i32>,
}

#[derive(Debug, Serialize)]
struct SearchResultsBody {
    results: Vec<SnapshotSummary>,
    total: i64,
    page: i64,
    #[serde(rename = "pageSize")]
    page_size: i64,
}

pub async fn search_handler(State(state): State<AppState>, Query(q): Query<SearchQuery>) -> HaResult<Json<SearchResultsBody>> {
    let params = SearchParams {
        q: q.q.filter(|s| !s.trim().is_empty()),
        source: q.source,
        sort: q.sort.as_deref().map(Sort::parse).transpose()?,
        view: q.view.as_deref().map(View::parse).transpose()?.unwrap_or(View::Snapshots),
        include_non_2xx: q.include_non_2xx.unwrap_or(false),
        from: parse_date_bound(&q.from, "from")?,
        to: parse_date_bound(&q.to, "to")?,
        language: q.language,
        page: q.page.unwrap_or(1),
        page_size: q.page_size.unwrap_or(20),
    };

    let resp: SearchResponse = search::search(&state.ctx, params, state.settings.search_ranking_version).await?;
    let body = to_results_body(&state, resp).await?;
    Ok(Json(body))
}

async fn to_results_body(state: &AppState, resp: SearchResponse) -> HaResult<SearchResultsBody> {
    // Source code/name lookup per hit; cached per-request since a
    // result page spans at most a handful of distinct sources.
    let mut source_names: HashMap<String, (String, String)> = HashMap::new();
    let mut results = Vec::with_capacity(resp.results.len());

    for hit in resp.results {
        let snapshot = hit.snapshot;
        let (code, name) = match source_names.get(&snapshot.source_id) {
            Some(pair) => pair.clone(),
            None => {
                let source = state.ctx.sources().get(&snapshot.source_id).await?;
                let pair = source.map(|s| (s.code, s.name)).unwrap_or_else(|| ("unknown".to_string(), "Unknown".to_string()));
                source_names.insert(snapshot.source_id.clone(), pair.clone());
                pair
            }
        };

        results.push(SnapshotSummary {
            source_code: code,
            source_name: name,
            language: snapshot.language.as_str().to_string(),
            capture_date: snapshot.capture_timestamp.to_rfc3339(),
            original_url: snapshot.url.clone(),
            raw_snapshot_url: format!("/api/snapshots/raw/{}", snapshot.id),
            page_snapshots_count: hit.page_snapshot_count,
            title: snapshot.title,
            snippet: snapshot.snippet,
            id: snapshot.id,
        });
    }

    Ok(SearchResultsBody { results, total: resp.total, page: resp.page, page_size: resp.page_size })
}

// ---------------------------------------------------------------------
// GET /api/snapshot/{id}
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SnapshotDetail {
    id: String,
    #[serde(rename = "jobId")]
    job_id: String,
    #[serde(rename = "sourceId")]
    source_id: String,
    url: String,
    #[serde(rename = "normalizedUrlGroup")]
    normalized_url_group: String,
    #[serde(rename = "captureTimestamp")]
    capture_timestamp: String,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
    #[serde(rename = "statusCode")]
    status_code: Option<i32>,
    title: Option<String>,
    snippet: Option<String>,
    language: String,
    #[serde(rename = "contentHash")]
    content_hash: String,
    #[serde(rename = "isArchived")]
    is_archived: Option<bool>,
}

impl From<Snapshot> for SnapshotDetail {
    fn from(s: Snapshot) -> Self {
        SnapshotDetail {
            id: s.id,
            job_id: s.job_id,
            source_id: s.source_id,
            url: s.url,
            normalized_url_group: s.normalized_url_group,
            capture_timestamp: s.capture_timestamp.to_rfc3339(),
            mime_type: s.mime_type,
            status_code: s.status_code,
            title: s.title,
            snippet: s.snippet,
            language: s.language.as_str().to_string(),
            content_hash: s.content_hash,
            is_archived: s.is_archived,
        }
    }
}

pub async fn snapshot_detail(State(state): State<AppState>, Path(id): Path<String>) -> HaResult<Json<SnapshotDetail>> {
    let snapshot = state
        .ctx
        .snapshots()
        .get(&id)
        .await?
        .ok_or_else(|| HaError::NotFound(format!("snapshot {id} not found")))?;
    Ok(Json(snapshot.into()))
}

// ---------------------------------------------------------------------
// GET /api/snapshots/raw/{id}
// ---------------------------------------------------------------------

pub async fn snapshot_raw(State(state): State<AppState>, Path(id): Path<String>) -> HaResult<Response> {
    let snapshot = state
        .ctx
        .snapshots()
        .get(&id)
        .await?
        .ok_or_else(|| HaError::NotFound(format!("snapshot {id} not found")))?;

    let warc_path = std::path::PathBuf::from(&snapshot.warc_path);
    let mut reader = WarcHtmlReader::open(&warc_path)
        .map_err(|_| HaError::NotFound(format!("WARC file for snapshot {id} is missing")))?;

    // Seek-by-record-id when available (spec §4.E); otherwise linearly
    // scan for the first record matching (url, capture_timestamp).
    while let Some(record) = reader.next_html_record()? {
        let id_matches = snapshot.warc_record_id.as_deref().map(|want| want == record.warc_record_id).unwrap_or(false);
        let fallback_matches = record.url == snapshot.url && record.capture_timestamp == snapshot.capture_timestamp;
        if id_matches || fallback_matches {
            let html = String::from_utf8_lossy(&record.body).into_owned();
            return Ok(([(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response());
        }
    }

    Err(HaError::NotFound(format!("no matching WARC record for snapshot {id}")))
}

// ---------------------------------------------------------------------
// GET /api/changes, /api/changes/compare, /api/snapshots/{id}/timeline
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    group: String,
}

pub async fn changes_for_group(State(state): State<AppState>, Query(q): Query<ChangesQuery>) -> HaResult<Json<serde_json::Value>> {
    let changes = state.ctx.changes().list_for_group(&q.group).await?;
    Ok(Json(json!({ "normalizedUrlGroup": q.group, "changes": changes_to_json(&changes) })))
}

#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    from: String,
    to: String,
}

pub async fn changes_compare(State(state): State<AppState>, Query(q): Query<CompareQuery>) -> HaResult<Json<serde_json::Value>> {
    let change = state.ctx.changes().compare(&q.from, &q.to).await?;
    match change {
        Some(c) => Ok(Json(json!({
            "fromSnapshotId": c.from_snapshot_id,
            "toSnapshotId": c.to_snapshot_id,
            "sectionsChanged": c.sections_changed,
            "linesChanged": c.lines_changed,
            "diffArtifact": c.diff_artifact,
        }))),
        None => Err(HaError::NotFound(format!("no change record between {} and {}", q.from, q.to))),
    }
}

pub async fn snapshot_timeline(State(state): State<AppState>, Path(id): Path<String>) -> HaResult<Json<serde_json::Value>> {
    let snapshot = state
        .ctx
        .snapshots()
        .get(&id)
        .await?
        .ok_or_else(|| HaError::NotFound(format!("snapshot {id} not found")))?;

    let group_snapshots = state.ctx.snapshots().list_by_group(&snapshot.normalized_url_group).await?;
    let changes = state.ctx.changes().list_for_group(&snapshot.normalized_url_group).await?;

    Ok(Json(json!({
        "normalizedUrlGroup": snapshot.normalized_url_group,
        "captures": group_snapshots.iter().map(|s| json!({
            "id": s.id,
            "captureTimestamp": s.capture_timestamp.to_rfc3339(),
            "contentHash": s.content_hash,
        })).collect::<Vec<_>>(),
        "changes": changes_to_json(&changes),
    })))
}

fn changes_to_json(changes: &[crate::models::SnapshotChange]) -> Vec<serde_json::Value> {
    changes
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "fromSnapshotId": c.from_snapshot_id,
                "toSnapshotId": c.to_snapshot_id,
                "fromTimestamp": c.from_timestamp.to_rfc3339(),
                "toTimestamp": c.to_timestamp.to_rfc3339(),
                "sectionsChanged": c.sections_changed,
                "linesChanged": c.lines_changed,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------
// Admin surface (spec §6, token-gated)
// ---------------------------------------------------------------------

/// Extracts the bearer token from `Authorization: Bearer <token>` and
/// rejects the request unless it matches `ADMIN_TOKEN` (or, in
/// `development`, unless no token is configured at all — spec §6 "dev
/// may leave it unset").
pub fn require_admin(state: &AppState, headers: &HeaderMap) -> HaResult<()> {
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if state.admin_token_matches(presented) {
        Ok(())
    } else {
        Err(HaError::Validation("admin token missing or invalid".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct AdminJobsQuery {
    source: Option<String>,
    status: Option<String>,
    limit: Option<i64>,
}

pub async fn admin_jobs(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<AdminJobsQuery>) -> HaResult<Json<serde_json::Value>> {
    require_admin(&state, &headers)?;
    let limit = q.limit.unwrap_or(100).clamp(1, 500);

    let jobs = if let Some(status_raw) = &q.status {
        let status = JobStatus::parse(status_raw).ok_or_else(|| HaError::Validation(format!("unknown status: {status_raw}")))?;
        state.ctx.jobs().list_by_status(status, limit).await?
    } else if let Some(code) = &q.source {
        let source = state
            .ctx
            .sources()
            .get_by_code(code)
            .await?
            .ok_or_else(|| HaError::Validation(format!("unknown source code: {code}")))?;
        let mut jobs = state.ctx.jobs().list_by_source(&source.id).await?;
        jobs.truncate(limit as usize);
        jobs
    } else {
        // No filter: fall back to the most recently queued jobs across
        // every selectable status, bounded by `limit`.
        let mut all = Vec::new();
        for status in [JobStatus::Queued, JobStatus::Running, JobStatus::Retryable, JobStatus::Indexed] {
            all.extend(state.ctx.jobs().list_by_status(status, limit).await?);
        }
        all.truncate(limit as usize);
        all
    };

    Ok(Json(json!(jobs.into_iter().map(job_summary).collect::<Vec<_>>())))
}

fn job_summary(job: crate::models::ArchiveJob) -> serde_json::Value {
    json!({
        "id": job.id,
        "sourceId": job.source_id,
        "name": job.name,
        "status": job.status.as_str(),
        "retryCount": job.retry_count,
        "crawlerStatus": job.crawler_status.map(|s| s.as_str()),
        "warcFileCount": job.warc_file_count,
        "indexedPageCount": job.indexed_page_count,
        "queuedAt": job.queued_at.to_rfc3339(),
        "startedAt": job.started_at.map(|t| t.to_rfc3339()),
        "finishedAt": job.finished_at.map(|t| t.to_rfc3339()),
    })
}

pub async fn admin_job_detail(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> HaResult<Json<serde_json::Value>> {
    require_admin(&state, &headers)?;
    let job = state.ctx.jobs().require(&id).await?;
    Ok(Json(job_summary(job)))
}

pub async fn admin_job_status_counts(State(state): State<AppState>, headers: HeaderMap) -> HaResult<Json<serde_json::Value>> {
    require_admin(&state, &headers)?;
    let counts: HashMap<String, i64> = state.ctx.jobs().status_counts().await?.into_iter().collect();
    Ok(Json(json!(counts)))
}

pub async fn admin_job_snapshots(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> HaResult<Json<serde_json::Value>> {
    require_admin(&state, &headers)?;
    // Validates the job exists before reporting an (possibly empty) snapshot count.
    state.ctx.jobs().require(&id).await?;
    let count = state.ctx.snapshots().count_by_job(&id).await?;
    Ok(Json(json!({ "jobId": id, "snapshotCount": count })))
}

// ---------------------------------------------------------------------
// GET /metrics
// ---------------------------------------------------------------------

pub async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> HaResult<Response> {
    require_admin(&state, &headers)?;

    let status_counts = state.ctx.jobs().status_counts().await?;
    let total_snapshots = state.ctx.snapshots().count_total().await?;
    let sources = state.ctx.sources().get_all().await?;

    let mut out = String::new();
    out.push_str("# HELP healtharchive_jobs_total Archive jobs by status.\n");
    out.push_str("# TYPE healtharchive_jobs_total gauge\n");
    for (status, count) in &status_counts {
        out.push_str(&format!("healtharchive_jobs_total{{status=\"{status}\"}} {count}\n"));
    }

    out.push_str("# HELP healtharchive_snapshots_total Total indexed snapshots.\n");
    out.push_str("# TYPE healtharchive_snapshots_total gauge\n");
    out.push_str(&format!("healtharchive_snapshots_total {total_snapshots}\n"));

    out.push_str("# HELP healtharchive_snapshots_by_source_total Indexed snapshots per source.\n");
    out.push_str("# TYPE healtharchive_snapshots_by_source_total gauge\n");
    for source in &sources {
        let (count, _, _) = state.ctx.snapshots().count_and_range_by_source(&source.id).await?;
        out.push_str(&format!("healtharchive_snapshots_by_source_total{{source=\"{}\"}} {count}\n", source.code));
    }

    out.push_str("# HELP healtharchive_cleanup_total Jobs by cleanup_status.\n");
    out.push_str("# TYPE healtharchive_cleanup_total gauge\n");
    let mut cleaned = 0i64;
    let mut uncleaned = 0i64;
    let mut pages_crawled_total = 0i64;
    let mut pages_failed_total = 0i64;
    out.push_str("# HELP healtharchive_pages_crawled_total Best-effort pages crawled per source, summed across that source's jobs.\n");
    out.push_str("# TYPE healtharchive_pages_crawled_total gauge\n");
    let mut pages_crawled_lines = String::new();
    out.push_str("# HELP healtharchive_pages_failed_total Best-effort pages that failed extraction per source, summed across that source's jobs.\n");
    out.push_str("# TYPE healtharchive_pages_failed_total gauge\n");
    let mut pages_failed_lines = String::new();
    for source in &sources {
        let jobs = state.ctx.jobs().list_by_source(&source.id).await?;
        let mut source_pages_crawled = 0i64;
        let mut source_pages_failed = 0i64;
        for job in jobs {
            match job.cleanup_status {
                crate::models::CleanupStatus::TempCleaned => cleaned += 1,
                crate::models::CleanupStatus::None => uncleaned += 1,
            }
            source_pages_crawled += job.pages_crawled.unwrap_or(0) as i64;
            source_pages_failed += job.pages_failed.unwrap_or(0) as i64;
        }
        pages_crawled_lines.push_str(&format!("healtharchive_pages_crawled_total{{source=\"{}\"}} {source_pages_crawled}\n", source.code));
        pages_failed_lines.push_str(&format!("healtharchive_pages_failed_total{{source=\"{}\"}} {source_pages_failed}\n", source.code));
        pages_crawled_total += source_pages_crawled;
        pages_failed_total += source_pages_failed;
    }
    out.push_str(&format!("healtharchive_cleanup_total{{cleanup_status=\"temp_cleaned\"}} {cleaned}\n"));
    out.push_str(&format!("healtharchive_cleanup_total{{cleanup_status=\"none\"}} {uncleaned}\n"));
    out.push_str(&format!("healtharchive_pages_crawled_total{{source=\"all\"}} {pages_crawled_total}\n"));
    out.push_str(&pages_crawled_lines);
    out.push_str(&format!("healtharchive_pages_failed_total{{source=\"all\"}} {pages_failed_total}\n"));
    out.push_str(&pages_failed_lines);

    Ok(([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], out).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::models::{ArchiveJob, JobConfig, Source, ToolOptions};
    use crate::repository::{DbContext, DbPool};
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::tempdir;
    use tower::ServiceExt;

    async fn test_app() -> (axum::Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let ctx = DbContext::new(DbPool::sqlite_from_path(&db_path), dir.path().to_path_buf());
        ctx.init_schema().await.unwrap();

        let settings = Settings::for_test(dir.path());
        let state = AppState::new(ctx, settings);
        (super::super::routes::create_router(state), dir)
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let (app, _dir) = test_app().await;
        let resp = app.oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn search_with_bad_page_size_is_422() {
        let (app, _dir) = test_app().await;
        let resp = app
            .oneshot(Request::builder().uri("/api/search?pageSize=0").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn snapshot_not_found_is_404() {
        let (app, _dir) = test_app().await;
        let resp = app
            .oneshot(Request::builder().uri("/api/snapshot/does-not-exist").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_jobs_without_token_in_dev_is_allowed() {
        let (app, _dir) = test_app().await;
        let resp = app
            .oneshot(Request::builder().uri("/api/admin/jobs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn search_end_to_end_finds_indexed_snapshot() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let ctx = DbContext::new(DbPool::sqlite_from_path(&db_path), dir.path().to_path_buf());
        ctx.init_schema().await.unwrap();

        let source = Source::new("hc", "Health Canada", "https://www.canada.ca");
        ctx.sources().save(&source).await.unwrap();
        let job = ArchiveJob::new(
            &source.id,
            "hc-job",
            "/archive/hc/job",
            JobConfig { seeds: vec![], tool_options: ToolOptions::default(), passthrough_args: vec![] },
        );
        ctx.jobs().insert(&job).await.unwrap();

        let mut snap = crate::models::Snapshot::new(
            &job.id,
            &source.id,
            "https://www.canada.ca/en/vaccines.html",
            "canada.ca/en/vaccines.html",
            Utc::now(),
            "/archive/a.warc.gz",
            "hash",
        );
        snap.title = Some("COVID-19 vaccines".to_string());
        snap.status_code = Some(200);
        ctx.snapshots().insert_batch(&[snap]).await.unwrap();

        let settings = Settings::for_test(dir.path());
        let state = AppState::new(ctx, settings);
        let app = super::super::routes::create_router(state);

        let resp = app
            .oneshot(Request::builder().uri("/api/search?q=vaccines").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["results"][0]["sourceCode"], "hc");
    }

    #[tokio::test]
    async fn metrics_exposes_pages_crawled_and_failed_counters() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let ctx = DbContext::new(DbPool::sqlite_from_path(&db_path), dir.path().to_path_buf());
        ctx.init_schema().await.unwrap();

        let source = Source::new("hc", "Health Canada", "https://www.canada.ca");
        ctx.sources().save(&source).await.unwrap();
        let mut job = ArchiveJob::new(
            &source.id,
            "hc-job",
            "/archive/hc/job",
            JobConfig { seeds: vec![], tool_options: ToolOptions::default(), passthrough_args: vec![] },
        );
        job.pages_crawled = Some(7);
        job.pages_failed = Some(2);
        ctx.jobs().insert(&job).await.unwrap();

        let settings = Settings::for_test(dir.path());
        let state = AppState::new(ctx, settings);
        let app = super::super::routes::create_router(state);

        let resp = app.oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("healtharchive_pages_crawled_total{source=\"hc\"} 7"));
        assert!(text.contains("healtharchive_pages_failed_total{source=\"hc\"} 2"));
        assert!(text.contains("healtharchive_pages_crawled_total{source=\"all\"} 7"));
        assert!(text.contains("healtharchive_pages_failed_total{source=\"all\"} 2"));
    }
}
