use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tool_options::ToolOptions;

/// `ArchiveJob.status` state machine (spec §3 invariant I1, §4.C/§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Retryable,
    Failed,
    Completed,
    Indexing,
    Indexed,
    IndexFailed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Retryable => "retryable",
            JobStatus::Failed => "failed",
            JobStatus::Completed => "completed",
            JobStatus::Indexing => "indexing",
            JobStatus::Indexed => "indexed",
            JobStatus::IndexFailed => "index_failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "queued" => JobStatus::Queued,
            "running" => JobStatus::Running,
            "retryable" => JobStatus::Retryable,
            "failed" => JobStatus::Failed,
            "completed" => JobStatus::Completed,
            "indexing" => JobStatus::Indexing,
            "indexed" => JobStatus::Indexed,
            "index_failed" => JobStatus::IndexFailed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlerStatus {
    Success,
    Failed,
    InfraError,
}

impl CrawlerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlerStatus::Success => "success",
            CrawlerStatus::Failed => "failed",
            CrawlerStatus::InfraError => "infra_error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "success" => CrawlerStatus::Success,
            "failed" => CrawlerStatus::Failed,
            "infra_error" => CrawlerStatus::InfraError,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStatus {
    None,
    TempCleaned,
}

impl CleanupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupStatus::None => "none",
            CleanupStatus::TempCleaned => "temp_cleaned",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "temp_cleaned" => CleanupStatus::TempCleaned,
            _ => CleanupStatus::None,
        }
    }
}

/// The opaque structured config blob carried on a job (spec §3): seeds,
/// tool_options, passthrough_args.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub seeds: Vec<String>,
    pub tool_options: ToolOptions,
    pub passthrough_args: Vec<String>,
}

/// One crawl attempt (and subsequent indexing) for a source (spec §3).
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    pub id: String,
    pub source_id: String,
    pub name: String,
    pub output_dir: String,

    pub status: JobStatus,

    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub retry_count: i32,

    pub config: JobConfig,

    pub crawler_exit_code: Option<i32>,
    pub crawler_status: Option<CrawlerStatus>,
    pub crawler_status_updated_at: Option<DateTime<Utc>>,
    pub crawler_stage: Option<String>,
    pub last_stats_json: Option<String>,
    pub combined_log_path: Option<String>,
    pub state_file_path: Option<String>,

    pub warc_file_count: i32,
    pub indexed_page_count: i32,
    pub pages_crawled: Option<i32>,
    pub pages_total: Option<i32>,
    pub pages_failed: Option<i32>,

    pub cleanup_status: CleanupStatus,
    pub cleaned_at: Option<DateTime<Utc>>,
}

impl ArchiveJob {
    pub fn new(source_id: impl Into<String>, name: impl Into<String>, output_dir: impl Into<String>, config: JobConfig) -> Self {
        let now = Utc::now();
        ArchiveJob {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            name: name.into(),
            output_dir: output_dir.into(),
            status: JobStatus::Queued,
            queued_at: now,
            started_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
            retry_count: 0,
            config,
            crawler_exit_code: None,
            crawler_status: None,
            crawler_status_updated_at: None,
            crawler_stage: None,
            last_stats_json: None,
            combined_log_path: None,
            state_file_path: None,
            warc_file_count: 0,
            indexed_page_count: 0,
            pages_crawled: None,
            pages_total: None,
            pages_failed: None,
            cleanup_status: CleanupStatus::None,
            cleaned_at: None,
        }
    }

    /// Eligible for worker selection (spec §4.D step 2).
    pub fn is_selectable(&self) -> bool {
        matches!(self.status, JobStatus::Queued | JobStatus::Retryable)
    }
}
