//! Search service (spec §4.I): parses a query into a mode, executes it
//! against the persistence layer, ranks, and groups into the
//! `snapshots`/`pages` views.
//!
//! Grounded on `server/handlers.rs`'s query-param parsing convention
//! (a typed params struct built from request input, validated once)
//! and on spec §9's multi-dialect-SQL redesign flag: candidates are
//! fetched through `SnapshotRepository::search_candidates`'s
//! capability-agnostic filter set, never by sniffing the backend.

pub mod query;
pub mod rank;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::RankingVersion;
use crate::error::{HaError, HaResult};
use crate::models::Snapshot;
use crate::repository::DbContext;
use query::{select_mode, QueryMode};

/// Upper bound on the in-memory candidate set pulled from the backend
/// before ranking/filtering (spec §4.A "bounded input set regardless of
/// corpus size"). `total` in the response is computed over this bounded
/// set, so a corpus larger than this cap under-reports `total` — an
/// accepted approximation given the single-node, bounded-candidate
/// design `search_candidates` already documents.
const CANDIDATE_LIMIT: i64 = 10_000;

const MAX_PAGE_SIZE: i64 = 100;
const DEFAULT_PAGE_SIZE: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    Relevance,
    Newest,
}

impl Sort {
    pub fn parse(raw: &str) -> HaResult<Self> {
        match raw {
            "relevance" => Ok(Sort::Relevance),
            "newest" => Ok(Sort::Newest),
            other => Err(HaError::Validation(format!("unknown sort: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Snapshots,
    Pages,
}

impl View {
    pub fn parse(raw: &str) -> HaResult<Self> {
        match raw {
            "snapshots" => Ok(View::Snapshots),
            "pages" => Ok(View::Pages),
            other => Err(HaError::Validation(format!("unknown view: {other}"))),
        }
    }
}

/// Validated search request (spec §4.I "Public contract").
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub q: Option<String>,
    pub source: Option<String>,
    pub sort: Option<Sort>,
    pub view: View,
    pub include_non_2xx: bool,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub language: Option<String>,
    pub page: i64,
    pub page_size: i64,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            q: None,
            source: None,
            sort: None,
            view: View::Snapshots,
            include_non_2xx: false,
            from: None,
            to: None,
            language: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SearchParams {
    /// Validates paging bounds (spec §8 "pageSize bounds": 0 -> 422,
    /// 101 -> 422, 100 accepted; `page >= 1`).
    fn validate(&self) -> HaResult<()> {
        if self.page < 1 {
            return Err(HaError::Validation("page must be >= 1".to_string()));
        }
        if self.page_size < 1 || self.page_size > MAX_PAGE_SIZE {
            return Err(HaError::Validation(format!(
                "pageSize must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(HaError::Validation("from must be <= to".to_string()));
            }
        }
        Ok(())
    }

    fn effective_sort(&self) -> Sort {
        self.sort.unwrap_or(if self.q.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false) {
            Sort::Relevance
        } else {
            Sort::Newest
        })
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub snapshot: Snapshot,
    /// Present only in `view=pages`: the number of snapshots in this hit's page group.
    pub page_snapshot_count: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

/// The public `search` operation (spec §4.I).
pub async fn search(ctx: &DbContext, params: SearchParams, ranking_version: RankingVersion) -> HaResult<SearchResponse> {
    params.validate()?;

    let source_id = match &params.source {
        Some(code) => {
            let source = ctx
                .sources()
                .get_by_code(code)
                .await
                .map_err(HaError::from)?
                .ok_or_else(|| HaError::Validation(format!("unknown source code: {code}")))?;
            Some(source.id)
        }
        None => None,
    };

    let sort = params.effective_sort();
    let mode = select_mode(params.q.as_deref());

    // Fast path (spec §4.I "pages" view fast path): empty q, no date
    // range, view=pages reads straight from the materialized table.
    if params.view == View::Pages && matches!(mode, QueryMode::Empty) && params.from.is_none() && params.to.is_none() {
        return pages_fast_path(ctx, &params, source_id.as_deref()).await;
    }

    let candidates = fetch_candidates(ctx, &params, source_id.as_deref(), &mode).await?;
    let inlinks = ctx.page_signals().all_as_map().await.map_err(HaError::from)?;

    let terms = match &mode {
        QueryMode::Boolean(ast) | QueryMode::Plaintext(ast) => ast.terms(),
        _ => Vec::new(),
    };

    let mut scored: Vec<(f64, Snapshot)> = candidates
        .into_iter()
        .map(|s| {
            let inlink_count = *inlinks.get(&s.normalized_url_group).unwrap_or(&0) as i64;
            let score = rank::score(&s, &terms, ranking_version, inlink_count);
            (score, s)
        })
        .collect();

    sort_results(&mut scored, sort, params.include_non_2xx);

    match params.view {
        View::Snapshots => Ok(paginate_snapshots(scored, params.page, params.page_size)),
        View::Pages => Ok(paginate_pages(scored, sort, params.include_non_2xx, params.page, params.page_size)),
    }
}

async fn fetch_candidates(
    ctx: &DbContext,
    params: &SearchParams,
    source_id: Option<&str>,
    mode: &QueryMode,
) -> HaResult<Vec<Snapshot>> {
    match mode {
        QueryMode::UrlLookup(variants) => {
            let snapshots = ctx.snapshots();
            for group in variants {
                let found = snapshots.list_by_group(group).await.map_err(HaError::from)?;
                if !found.is_empty() {
                    return Ok(filter_in_memory(found, params, source_id));
                }
            }
            Ok(Vec::new())
        }
        QueryMode::Empty => ctx
            .snapshots()
            .search_candidates(source_id, params.language.as_deref(), params.include_non_2xx, params.from, params.to, CANDIDATE_LIMIT)
            .await
            .map_err(HaError::from),
        QueryMode::Boolean(ast) => {
            let broad = ctx
                .snapshots()
                .search_candidates(source_id, params.language.as_deref(), params.include_non_2xx, params.from, params.to, CANDIDATE_LIMIT)
                .await
                .map_err(HaError::from)?;
            Ok(broad.into_iter().filter(|s| ast.matches(s)).collect())
        }
        QueryMode::Plaintext(ast) => {
            let broad = ctx
                .snapshots()
                .search_candidates(source_id, params.language.as_deref(), params.include_non_2xx, params.from, params.to, CANDIDATE_LIMIT)
                .await
                .map_err(HaError::from)?;
            // Spec §4.I mode 3: FTS first, tokenized-substring fallback
            // when FTS yields nothing. This backend tier has no native
            // FTS (see SPEC_FULL.md §E), so substring matching over the
            // bounded candidate set is the implemented tier directly.
            Ok(broad.into_iter().filter(|s| ast.matches(s)).collect())
        }
    }
}

fn filter_in_memory(candidates: Vec<Snapshot>, params: &SearchParams, source_id: Option<&str>) -> Vec<Snapshot> {
    candidates
        .into_iter()
        .filter(|s| source_id.map(|sid| s.source_id == sid).unwrap_or(true))
        .filter(|s| params.language.as_deref().map(|l| s.language.as_str() == l).unwrap_or(true))
        .filter(|s| {
            if params.include_non_2xx {
                true
            } else {
                s.status_code.map(|c| (200..300).contains(&c)).unwrap_or(true)
            }
        })
        .filter(|s| params.from.map(|f| s.capture_timestamp >= f).unwrap_or(true))
        .filter(|s| params.to.map(|t| s.capture_timestamp <= t).unwrap_or(true))
        .collect()
}

/// Status-code partition order (spec §4.I "When includeNon2xx=true,
/// results are partitioned: 2xx first, then 3xx, then unknown, then
/// 4xx/5xx").
fn status_partition(status: Option<i32>) -> u8 {
    match status {
        Some(c) if (200..300).contains(&c) => 0,
        Some(c) if (300..400).contains(&c) => 1,
        None => 2,
        Some(_) => 3,
    }
}

fn sort_results(scored: &mut [(f64, Snapshot)], sort: Sort, include_non_2xx: bool) {
    scored.sort_by(|(score_a, a), (score_b, b)| {
        let ordering = if include_non_2xx {
            status_partition(a.status_code).cmp(&status_partition(b.status_code))
        } else {
            std::cmp::Ordering::Equal
        };
        ordering
            .then_with(|| match sort {
                Sort::Relevance => score_b.partial_cmp(score_a).unwrap_or(std::cmp::Ordering::Equal),
                Sort::Newest => std::cmp::Ordering::Equal,
            })
            // Final tie-break (spec §4.I): capture_timestamp DESC, then id DESC.
            .then_with(|| b.capture_timestamp.cmp(&a.capture_timestamp))
            .then_with(|| b.id.cmp(&a.id))
    });
}

fn paginate_snapshots(scored: Vec<(f64, Snapshot)>, page: i64, page_size: i64) -> SearchResponse {
    let total = scored.len() as i64;
    let offset = ((page - 1) * page_size) as usize;
    let results = scored
        .into_iter()
        .skip(offset)
        .take(page_size as usize)
        .map(|(_, snapshot)| SearchHit { snapshot, page_snapshot_count: None })
        .collect();
    SearchResponse { results, total, page, page_size }
}

/// Groups the candidate set by `normalized_url_group`, keeping the
/// chronologically latest snapshot per group (spec §4.I "pages" view:
/// "returns the latest snapshot per group") — selection is by
/// `capture_timestamp` (ties broken by `id`), independent of relevance
/// score, exactly as `pages_fast_path`/`PagesRepository::refresh_group`
/// already pick the group's representative. The per-group
/// representatives are then re-sorted by the request's own sort order
/// so page results remain ranked consistently with the snapshots view.
fn paginate_pages(scored: Vec<(f64, Snapshot)>, sort: Sort, include_non_2xx: bool, page: i64, page_size: i64) -> SearchResponse {
    let mut counts: HashMap<String, i32> = HashMap::new();
    for (_, s) in &scored {
        *counts.entry(s.normalized_url_group.clone()).or_insert(0) += 1;
    }

    let mut latest_per_group: HashMap<String, (f64, Snapshot)> = HashMap::new();
    for (score, s) in scored {
        latest_per_group
            .entry(s.normalized_url_group.clone())
            .and_modify(|(best_score, best)| {
                if (s.capture_timestamp, s.id.as_str()) > (best.capture_timestamp, best.id.as_str()) {
                    *best = s.clone();
                    *best_score = score;
                }
            })
            .or_insert((score, s));
    }

    let mut latest_per_group: Vec<(f64, Snapshot)> = latest_per_group.into_values().collect();
    sort_results(&mut latest_per_group, sort, include_non_2xx);

    let total = latest_per_group.len() as i64;
    let offset = ((page - 1) * page_size) as usize;
    let results = latest_per_group
        .into_iter()
        .skip(offset)
        .take(page_size as usize)
        .map(|(_, snapshot)| {
            let count = *counts.get(&snapshot.normalized_url_group).unwrap_or(&1);
            SearchHit { snapshot, page_snapshot_count: Some(count) }
        })
        .collect();

    SearchResponse { results, total, page, page_size }
}

async fn pages_fast_path(ctx: &DbContext, params: &SearchParams, source_id: Option<&str>) -> HaResult<SearchResponse> {
    let pages = ctx.pages();
    let total = pages.count_all().await.map_err(HaError::from)?;
    let offset = (params.page - 1) * params.page_size;
    let rows = pages.page(source_id, offset, params.page_size).await.map_err(HaError::from)?;

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(snapshot) = ctx.snapshots().get(&row.latest_snapshot_id).await.map_err(HaError::from)? {
            results.push(SearchHit { snapshot, page_snapshot_count: Some(row.snapshot_count) });
        }
    }

    Ok(SearchResponse { results, total, page: params.page, page_size: params.page_size })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobConfig, Source, ToolOptions};
    use crate::repository::pool::DbPool;
    use crate::repository::DbContext as Ctx;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    async fn setup() -> (Ctx, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let ctx = Ctx::new(DbPool::sqlite_from_path(&db_path), dir.path().to_path_buf());
        ctx.init_schema().await.unwrap();
        (ctx, dir)
    }

    async fn seed_snapshot(ctx: &Ctx, title: &str, url: &str, group: &str, status: Option<i32>, at: DateTime<Utc>) {
        let source = match ctx.sources().get_by_code("hc").await.unwrap() {
            Some(s) => s,
            None => {
                let s = Source::new("hc", "Health Canada", "https://www.canada.ca");
                ctx.sources().save(&s).await.unwrap();
                s
            }
        };
        let job = crate::models::ArchiveJob::new(
            &source.id,
            "hc-job",
            "/archive/hc/job",
            JobConfig { seeds: vec![], tool_options: ToolOptions::default(), passthrough_args: vec![] },
        );
        ctx.jobs().insert(&job).await.unwrap();

        let mut snap = Snapshot::new(&job.id, &source.id, url, group, at, "/archive/a.warc.gz", "hash");
        snap.title = Some(title.to_string());
        snap.status_code = status;
        ctx.snapshots().insert_batch(&[snap]).await.unwrap();
    }

    #[tokio::test]
    async fn plaintext_query_finds_title_match() {
        let (ctx, _dir) = setup().await;
        seed_snapshot(&ctx, "COVID-19 vaccines", "https://www.canada.ca/en/vaccines.html", "canada.ca/en/vaccines.html", Some(200), Utc::now()).await;

        let params = SearchParams { q: Some("vaccines".to_string()), ..Default::default() };
        let resp = search(&ctx, params, RankingVersion::V3).await.unwrap();
        assert_eq!(resp.total, 1);
        assert_eq!(resp.results[0].snapshot.title.as_deref(), Some("COVID-19 vaccines"));
    }

    #[tokio::test]
    async fn excludes_non_2xx_by_default() {
        let (ctx, _dir) = setup().await;
        seed_snapshot(&ctx, "Gone page", "https://www.canada.ca/en/gone.html", "canada.ca/en/gone.html", Some(404), Utc::now()).await;

        let params = SearchParams { q: Some("Gone".to_string()), ..Default::default() };
        let resp = search(&ctx, params, RankingVersion::V3).await.unwrap();
        assert_eq!(resp.total, 0);
    }

    #[tokio::test]
    async fn include_non_2xx_orders_after_2xx() {
        let (ctx, _dir) = setup().await;
        let now = Utc::now();
        seed_snapshot(&ctx, "Gone vaccines page", "https://www.canada.ca/en/gone.html", "canada.ca/en/gone.html", Some(404), now).await;
        seed_snapshot(&ctx, "Live vaccines page", "https://www.canada.ca/en/live.html", "canada.ca/en/live.html", Some(200), now - Duration::hours(1)).await;

        let params = SearchParams { q: Some("vaccines".to_string()), include_non_2xx: true, ..Default::default() };
        let resp = search(&ctx, params, RankingVersion::V3).await.unwrap();
        assert_eq!(resp.total, 2);
        assert_eq!(resp.results[0].snapshot.status_code, Some(200));
        assert_eq!(resp.results[1].snapshot.status_code, Some(404));
    }

    #[tokio::test]
    async fn empty_query_newest_sort_orders_by_capture_time_desc() {
        let (ctx, _dir) = setup().await;
        let now = Utc::now();
        seed_snapshot(&ctx, "Older", "https://www.canada.ca/en/a.html", "canada.ca/en/a.html", Some(200), now - Duration::hours(2)).await;
        seed_snapshot(&ctx, "Newer", "https://www.canada.ca/en/b.html", "canada.ca/en/b.html", Some(200), now).await;

        let resp = search(&ctx, SearchParams::default(), RankingVersion::V3).await.unwrap();
        assert_eq!(resp.results[0].snapshot.title.as_deref(), Some("Newer"));
        assert_eq!(resp.results[1].snapshot.title.as_deref(), Some("Older"));
    }

    #[tokio::test]
    async fn pages_view_total_never_exceeds_snapshots_view_total() {
        let (ctx, _dir) = setup().await;
        let now = Utc::now();
        seed_snapshot(&ctx, "v1", "https://www.canada.ca/en/a.html", "canada.ca/en/a.html", Some(200), now - Duration::hours(1)).await;
        seed_snapshot(&ctx, "v2", "https://www.canada.ca/en/a.html", "canada.ca/en/a.html", Some(200), now).await;

        let snap_resp = search(&ctx, SearchParams { q: Some("v".to_string()), ..Default::default() }, RankingVersion::V3).await.unwrap();
        let page_resp = search(
            &ctx,
            SearchParams { q: Some("v".to_string()), view: View::Pages, ..Default::default() },
            RankingVersion::V3,
        )
        .await
        .unwrap();

        assert!(page_resp.total <= snap_resp.total);
        assert_eq!(page_resp.total, 1);
        assert_eq!(page_resp.results[0].page_snapshot_count, Some(2));
    }

    #[tokio::test]
    async fn pages_view_returns_latest_snapshot_even_when_older_one_scores_higher() {
        let (ctx, _dir) = setup().await;
        let now = Utc::now();
        let source = Source::new("hc", "Health Canada", "https://www.canada.ca");
        ctx.sources().save(&source).await.unwrap();
        let job = crate::models::ArchiveJob::new(
            &source.id,
            "hc-job",
            "/archive/hc/job",
            JobConfig { seeds: vec![], tool_options: ToolOptions::default(), passthrough_args: vec![] },
        );
        ctx.jobs().insert(&job).await.unwrap();

        // Older capture: matches in the title (weight 3.0), so it outscores the
        // newer capture on relevance alone.
        let mut older = Snapshot::new(&job.id, &source.id, "https://www.canada.ca/en/a.html", "canada.ca/en/a.html", now - Duration::days(900), "/archive/a.warc.gz", "hash-old");
        older.title = Some("vaccines".to_string());
        older.status_code = Some(200);
        // Newer capture of the same group: only a weak snippet match (weight 1.0).
        let mut newer = Snapshot::new(&job.id, &source.id, "https://www.canada.ca/en/a.html", "canada.ca/en/a.html", now, "/archive/a.warc.gz", "hash-new");
        newer.title = Some("Health Canada".to_string());
        newer.snippet = Some("vaccines update".to_string());
        newer.status_code = Some(200);
        ctx.snapshots().insert_batch(&[older, newer]).await.unwrap();

        let resp = search(
            &ctx,
            SearchParams { q: Some("vaccines".to_string()), view: View::Pages, ..Default::default() },
            RankingVersion::V3,
        )
        .await
        .unwrap();

        assert_eq!(resp.total, 1);
        assert_eq!(resp.results[0].snapshot.title.as_deref(), Some("Health Canada"), "pages view must return the chronologically latest snapshot, not the highest-scoring one");
    }

    #[tokio::test]
    async fn page_size_out_of_range_is_validation_error() {
        let (ctx, _dir) = setup().await;
        let err = search(&ctx, SearchParams { page_size: 0, ..Default::default() }, RankingVersion::V3).await.unwrap_err();
        assert!(matches!(err, HaError::Validation(_)));
        let err = search(&ctx, SearchParams { page_size: 101, ..Default::default() }, RankingVersion::V3).await.unwrap_err();
        assert!(matches!(err, HaError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_source_code_is_validation_error() {
        let (ctx, _dir) = setup().await;
        let err = search(&ctx, SearchParams { source: Some("nope".to_string()), ..Default::default() }, RankingVersion::V3)
            .await
            .unwrap_err();
        assert!(matches!(err, HaError::Validation(_)));
    }
}
