//! Process-wide settings, constructed once at startup and threaded into
//! every component explicitly (no global env reads at import time — see
//! SPEC_FULL.md §C / spec.md §9's "global mutable config" redesign flag).

use std::path::PathBuf;

use crate::error::{HaError, HaResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "staging" => Environment::Staging,
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn requires_admin_token(&self) -> bool {
        matches!(self, Environment::Staging | Environment::Production)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingVersion {
    V1,
    V2,
    V3,
}

impl RankingVersion {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "v1" => RankingVersion::V1,
            "v2" => RankingVersion::V2,
            _ => RankingVersion::V3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub archive_root: PathBuf,
    pub database_url: String,
    pub environment: Environment,
    pub admin_token: Option<String>,
    pub cors_origins: Vec<String>,
    pub log_level: String,
    pub search_ranking_version: RankingVersion,
    pub replay_base_url: Option<String>,
    pub usage_metrics_enabled: bool,
    pub usage_metrics_window_days: u32,

    // Worker / job operational knobs (spec §4, defaults per §4.D/§4.J).
    pub worker_poll_interval_seconds: u64,
    pub max_retries: i32,
    pub infra_error_cooldown_minutes: i64,
    pub disk_headroom_threshold_percent: u8,
    pub stale_job_threshold_minutes: i64,
    pub index_flush_batch_size: usize,
    pub change_tracker_batch_cap: usize,
}

impl Settings {
    /// Build settings from the process environment. Call after
    /// `dotenvy::dotenv().ok()` so a `.env` file is honored.
    pub fn from_env() -> HaResult<Self> {
        let archive_root = std::env::var("ARCHIVE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./archive"));

        let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            archive_root.join("healtharchive.sqlite3").display().to_string()
        });

        let environment = Environment::parse(&std::env::var("ENV").unwrap_or_default());
        let admin_token = std::env::var("ADMIN_TOKEN").ok().filter(|s| !s.is_empty());

        if environment.requires_admin_token() && admin_token.is_none() {
            return Err(HaError::Validation(
                "ADMIN_TOKEN must be set in staging/production before starting".to_string(),
            ));
        }

        let cors_origins = std::env::var("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string());

        let search_ranking_version =
            RankingVersion::parse(&std::env::var("SEARCH_RANKING_VERSION").unwrap_or_default());

        let replay_base_url = std::env::var("REPLAY_BASE_URL").ok().filter(|s| !s.is_empty());

        let usage_metrics_enabled = std::env::var("USAGE_METRICS_ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let usage_metrics_window_days = std::env::var("USAGE_METRICS_WINDOW_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Ok(Settings {
            archive_root,
            database_url,
            environment,
            admin_token,
            cors_origins,
            log_level,
            search_ranking_version,
            replay_base_url,
            usage_metrics_enabled,
            usage_metrics_window_days,
            worker_poll_interval_seconds: env_u64("WORKER_POLL_INTERVAL_SECONDS", 30),
            max_retries: env_u64("MAX_RETRIES", 3) as i32,
            infra_error_cooldown_minutes: env_u64("INFRA_ERROR_COOLDOWN_MINUTES", 10) as i64,
            disk_headroom_threshold_percent: env_u64("DISK_HEADROOM_THRESHOLD_PERCENT", 85) as u8,
            stale_job_threshold_minutes: env_u64("STALE_JOB_THRESHOLD_MINUTES", 60) as i64,
            index_flush_batch_size: env_u64("INDEX_FLUSH_BATCH_SIZE", 500) as usize,
            change_tracker_batch_cap: env_u64("CHANGE_TRACKER_BATCH_CAP", 200) as usize,
        })
    }

    /// Settings for tests: an isolated tempdir archive root and a fresh
    /// SQLite file within it.
    #[cfg(test)]
    pub fn for_test(dir: &std::path::Path) -> Self {
        Settings {
            archive_root: dir.to_path_buf(),
            database_url: dir.join("test.sqlite3").display().to_string(),
            environment: Environment::Development,
            admin_token: None,
            cors_origins: vec![],
            log_level: "debug".to_string(),
            search_ranking_version: RankingVersion::V3,
            replay_base_url: None,
            usage_metrics_enabled: false,
            usage_metrics_window_days: 30,
            worker_poll_interval_seconds: 1,
            max_retries: 3,
            infra_error_cooldown_minutes: 10,
            disk_headroom_threshold_percent: 85,
            stale_job_threshold_minutes: 60,
            index_flush_batch_size: 500,
            change_tracker_batch_cap: 200,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
