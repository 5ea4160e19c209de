//! Diesel `Queryable`/`Insertable` record structs mapping table rows to
//! domain models. Kept separate from `crate::models` so the domain types
//! stay free of diesel derives (mirrors the teacher's
//! `repository/diesel_models.rs` split).

use diesel::prelude::*;

use crate::schema::{archive_jobs, page_signals, pages, snapshot_changes, snapshots, sources};

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = sources)]
pub struct SourceRecord {
    pub id: String,
    pub code: String,
    pub name: String,
    pub base_url: String,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = archive_jobs)]
pub struct ArchiveJobRecord {
    pub id: String,
    pub source_id: String,
    pub name: String,
    pub output_dir: String,
    pub status: String,
    pub queued_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub retry_count: i32,
    pub seeds: String,
    pub tool_options: String,
    pub passthrough_args: String,
    pub crawler_exit_code: Option<i32>,
    pub crawler_status: Option<String>,
    pub crawler_status_updated_at: Option<String>,
    pub crawler_stage: Option<String>,
    pub last_stats_json: Option<String>,
    pub combined_log_path: Option<String>,
    pub state_file_path: Option<String>,
    pub warc_file_count: i32,
    pub indexed_page_count: i32,
    pub pages_crawled: Option<i32>,
    pub pages_total: Option<i32>,
    pub pages_failed: Option<i32>,
    pub cleanup_status: String,
    pub cleaned_at: Option<String>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = snapshots)]
pub struct SnapshotRecord {
    pub id: String,
    pub job_id: String,
    pub source_id: String,
    pub url: String,
    pub normalized_url_group: String,
    pub capture_timestamp: String,
    pub mime_type: Option<String>,
    pub status_code: Option<i32>,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub content_text: Option<String>,
    pub language: Option<String>,
    pub content_hash: String,
    pub is_archived: Option<bool>,
    pub warc_path: String,
    pub warc_record_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = snapshot_changes)]
pub struct SnapshotChangeRecord {
    pub id: String,
    pub from_snapshot_id: String,
    pub to_snapshot_id: String,
    pub normalized_url_group: String,
    pub from_timestamp: String,
    pub to_timestamp: String,
    pub sections_changed: i32,
    pub lines_changed: i32,
    pub diff_artifact: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = page_signals)]
pub struct PageSignalRecord {
    pub normalized_url_group: String,
    pub inlink_count: i32,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = pages)]
pub struct PageRecord {
    pub normalized_url_group: String,
    pub latest_snapshot_id: String,
    pub source_id: String,
    pub snapshot_count: i32,
    pub updated_at: String,
}
