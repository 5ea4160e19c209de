//! Database context: owns the connection pool, vends per-entity
//! repositories, and bootstraps the schema on both backends.

use std::path::{Path, PathBuf};

use diesel_async::SimpleAsyncConnection;

use super::changes::ChangeRepository;
use super::jobs::JobRepository;
use super::page_signals::PageSignalRepository;
use super::pages::PageRepository;
use super::pool::{DbError, DbPool, SqliteConn};
use super::snapshots::SnapshotRepository;
use super::sources::SourceRepository;
use crate::with_conn_split;

#[cfg(feature = "postgres")]
use diesel_async::AsyncPgConnection;

const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    base_url TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS archive_jobs (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES sources(id),
    name TEXT NOT NULL,
    output_dir TEXT NOT NULL,
    status TEXT NOT NULL,
    queued_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    seeds TEXT NOT NULL,
    tool_options TEXT NOT NULL,
    passthrough_args TEXT NOT NULL,
    crawler_exit_code INTEGER,
    crawler_status TEXT,
    crawler_status_updated_at TEXT,
    crawler_stage TEXT,
    last_stats_json TEXT,
    combined_log_path TEXT,
    state_file_path TEXT,
    warc_file_count INTEGER NOT NULL DEFAULT 0,
    indexed_page_count INTEGER NOT NULL DEFAULT 0,
    pages_crawled INTEGER,
    pages_total INTEGER,
    pages_failed INTEGER,
    cleanup_status TEXT NOT NULL DEFAULT 'none',
    cleaned_at TEXT
);

CREATE TABLE IF NOT EXISTS snapshots (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL REFERENCES archive_jobs(id),
    source_id TEXT NOT NULL REFERENCES sources(id),
    url TEXT NOT NULL,
    normalized_url_group TEXT NOT NULL,
    capture_timestamp TEXT NOT NULL,
    mime_type TEXT,
    status_code INTEGER,
    title TEXT,
    snippet TEXT,
    content_text TEXT,
    language TEXT,
    content_hash TEXT NOT NULL,
    is_archived INTEGER,
    warc_path TEXT NOT NULL,
    warc_record_id TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshot_changes (
    id TEXT PRIMARY KEY,
    from_snapshot_id TEXT NOT NULL REFERENCES snapshots(id),
    to_snapshot_id TEXT NOT NULL REFERENCES snapshots(id),
    normalized_url_group TEXT NOT NULL,
    from_timestamp TEXT NOT NULL,
    to_timestamp TEXT NOT NULL,
    sections_changed INTEGER NOT NULL DEFAULT 0,
    lines_changed INTEGER NOT NULL DEFAULT 0,
    diff_artifact TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(from_snapshot_id, to_snapshot_id)
);

CREATE TABLE IF NOT EXISTS page_signals (
    normalized_url_group TEXT PRIMARY KEY,
    inlink_count INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pages (
    normalized_url_group TEXT PRIMARY KEY,
    latest_snapshot_id TEXT NOT NULL,
    source_id TEXT NOT NULL,
    snapshot_count INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_archive_jobs_source_status ON archive_jobs(source_id, status);
CREATE INDEX IF NOT EXISTS idx_archive_jobs_queued_at ON archive_jobs(queued_at);
CREATE INDEX IF NOT EXISTS idx_snapshots_job ON snapshots(job_id);
CREATE INDEX IF NOT EXISTS idx_snapshots_group ON snapshots(normalized_url_group);
CREATE INDEX IF NOT EXISTS idx_snapshots_content_hash ON snapshots(content_hash);
CREATE INDEX IF NOT EXISTS idx_snapshot_changes_group ON snapshot_changes(normalized_url_group);
"#;

#[cfg(feature = "postgres")]
const POSTGRES_SCHEMA_STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS sources (
        id TEXT PRIMARY KEY,
        code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        base_url TEXT NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS archive_jobs (
        id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL REFERENCES sources(id),
        name TEXT NOT NULL,
        output_dir TEXT NOT NULL,
        status TEXT NOT NULL,
        queued_at TEXT NOT NULL,
        started_at TEXT,
        finished_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0,
        seeds TEXT NOT NULL,
        tool_options TEXT NOT NULL,
        passthrough_args TEXT NOT NULL,
        crawler_exit_code INTEGER,
        crawler_status TEXT,
        crawler_status_updated_at TEXT,
        crawler_stage TEXT,
        last_stats_json TEXT,
        combined_log_path TEXT,
        state_file_path TEXT,
        warc_file_count INTEGER NOT NULL DEFAULT 0,
        indexed_page_count INTEGER NOT NULL DEFAULT 0,
        pages_crawled INTEGER,
        pages_total INTEGER,
        pages_failed INTEGER,
        cleanup_status TEXT NOT NULL DEFAULT 'none',
        cleaned_at TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS snapshots (
        id TEXT PRIMARY KEY,
        job_id TEXT NOT NULL REFERENCES archive_jobs(id),
        source_id TEXT NOT NULL REFERENCES sources(id),
        url TEXT NOT NULL,
        normalized_url_group TEXT NOT NULL,
        capture_timestamp TEXT NOT NULL,
        mime_type TEXT,
        status_code INTEGER,
        title TEXT,
        snippet TEXT,
        content_text TEXT,
        language TEXT,
        content_hash TEXT NOT NULL,
        is_archived BOOLEAN,
        warc_path TEXT NOT NULL,
        warc_record_id TEXT,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS snapshot_changes (
        id TEXT PRIMARY KEY,
        from_snapshot_id TEXT NOT NULL REFERENCES snapshots(id),
        to_snapshot_id TEXT NOT NULL REFERENCES snapshots(id),
        normalized_url_group TEXT NOT NULL,
        from_timestamp TEXT NOT NULL,
        to_timestamp TEXT NOT NULL,
        sections_changed INTEGER NOT NULL DEFAULT 0,
        lines_changed INTEGER NOT NULL DEFAULT 0,
        diff_artifact TEXT,
        created_at TEXT NOT NULL,
        UNIQUE(from_snapshot_id, to_snapshot_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS page_signals (
        normalized_url_group TEXT PRIMARY KEY,
        inlink_count INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS pages (
        normalized_url_group TEXT PRIMARY KEY,
        latest_snapshot_id TEXT NOT NULL,
        source_id TEXT NOT NULL,
        snapshot_count INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_archive_jobs_source_status ON archive_jobs(source_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_archive_jobs_queued_at ON archive_jobs(queued_at)",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_job ON snapshots(job_id)",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_group ON snapshots(normalized_url_group)",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_content_hash ON snapshots(content_hash)",
    "CREATE INDEX IF NOT EXISTS idx_snapshot_changes_group ON snapshot_changes(normalized_url_group)",
];

/// Owns the pool and the archive root, and vends one repository per
/// entity. Construct one per process (CLI command, worker loop, or HTTP
/// server) and clone it freely — `DbPool` and `PathBuf` are cheap to
/// clone.
#[derive(Clone)]
pub struct DbContext {
    pool: DbPool,
    archive_root: PathBuf,
}

impl DbContext {
    pub fn new(pool: DbPool, archive_root: PathBuf) -> Self {
        DbContext { pool, archive_root }
    }

    pub fn from_url(database_url: &str, archive_root: &Path) -> Result<Self, DbError> {
        let pool = DbPool::from_url(database_url)?;
        Ok(DbContext {
            pool,
            archive_root: archive_root.to_path_buf(),
        })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    pub fn sources(&self) -> SourceRepository {
        SourceRepository::new(self.pool.clone())
    }

    pub fn jobs(&self) -> JobRepository {
        JobRepository::new(self.pool.clone())
    }

    pub fn snapshots(&self) -> SnapshotRepository {
        SnapshotRepository::new(self.pool.clone())
    }

    pub fn changes(&self) -> ChangeRepository {
        ChangeRepository::new(self.pool.clone())
    }

    pub fn page_signals(&self) -> PageSignalRepository {
        PageSignalRepository::new(self.pool.clone())
    }

    pub fn pages(&self) -> PageRepository {
        PageRepository::new(self.pool.clone())
    }

    /// Create all tables if they don't already exist (spec §4.A).
    pub async fn init_schema(&self) -> Result<(), DbError> {
        with_conn_split!(self.pool,
            sqlite: conn => Self::init_sqlite_schema(&mut conn).await,
            postgres: conn => Self::init_postgres_schema(&mut conn).await
        )
    }

    async fn init_sqlite_schema(conn: &mut SqliteConn) -> Result<(), DbError> {
        conn.batch_execute(SQLITE_SCHEMA).await
    }

    #[cfg(feature = "postgres")]
    async fn init_postgres_schema(conn: &mut AsyncPgConnection) -> Result<(), DbError> {
        use diesel_async::RunQueryDsl;
        for stmt in POSTGRES_SCHEMA_STATEMENTS {
            diesel::sql_query(*stmt).execute(conn).await?;
        }
        Ok(())
    }
}
