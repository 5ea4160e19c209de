use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    Fr,
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Fr => "fr",
            Language::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "en" => Language::En,
            "fr" => Language::Fr,
            _ => Language::Unknown,
        }
    }
}

/// One captured HTML response extracted from a WARC (spec §3 "Snapshot").
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: String,
    pub job_id: String,
    pub source_id: String,

    pub url: String,
    pub normalized_url_group: String,

    pub capture_timestamp: DateTime<Utc>,

    pub mime_type: Option<String>,
    pub status_code: Option<i32>,

    pub title: Option<String>,
    pub snippet: Option<String>,
    pub content_text: Option<String>,
    pub language: Language,
    pub content_hash: String,
    /// Tri-state: `None` = unknown, `Some(true/false)` = known.
    pub is_archived: Option<bool>,

    pub warc_path: String,
    pub warc_record_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: impl Into<String>,
        source_id: impl Into<String>,
        url: impl Into<String>,
        normalized_url_group: impl Into<String>,
        capture_timestamp: DateTime<Utc>,
        warc_path: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        Snapshot {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            source_id: source_id.into(),
            url: url.into(),
            normalized_url_group: normalized_url_group.into(),
            capture_timestamp,
            mime_type: None,
            status_code: None,
            title: None,
            snippet: None,
            content_text: None,
            language: Language::Unknown,
            content_hash: content_hash.into(),
            is_archived: None,
            warc_path: warc_path.into(),
            warc_record_id: None,
            created_at: Utc::now(),
        }
    }
}

/// An ordered transition between two snapshots of the same page group
/// (spec §3 "SnapshotChange").
#[derive(Debug, Clone)]
pub struct SnapshotChange {
    pub id: String,
    pub from_snapshot_id: String,
    pub to_snapshot_id: String,
    pub normalized_url_group: String,
    pub from_timestamp: DateTime<Utc>,
    pub to_timestamp: DateTime<Utc>,
    pub sections_changed: i32,
    pub lines_changed: i32,
    pub diff_artifact: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SnapshotChange {
    pub fn new(
        from_snapshot_id: impl Into<String>,
        to_snapshot_id: impl Into<String>,
        normalized_url_group: impl Into<String>,
        from_timestamp: DateTime<Utc>,
        to_timestamp: DateTime<Utc>,
        sections_changed: i32,
        lines_changed: i32,
        diff_artifact: Option<String>,
    ) -> Self {
        SnapshotChange {
            id: Uuid::new_v4().to_string(),
            from_snapshot_id: from_snapshot_id.into(),
            to_snapshot_id: to_snapshot_id.into(),
            normalized_url_group: normalized_url_group.into(),
            from_timestamp,
            to_timestamp,
            sections_changed,
            lines_changed,
            diff_artifact,
            created_at: Utc::now(),
        }
    }
}
