//! Repository layer: connection pooling (dual SQLite/Postgres backend)
//! and one repository struct per entity.

mod changes;
mod context;
mod jobs;
mod models;
mod page_signals;
mod pages;
pub mod pool;
mod snapshots;
mod sources;
pub mod util;

pub use changes::ChangeRepository;
pub use context::DbContext;
pub use jobs::JobRepository;
pub use page_signals::PageSignalRepository;
pub use pages::{PageRepository, PageRow};
pub use pool::{DbError, DbPool};
pub use snapshots::SnapshotRepository;
pub use sources::SourceRepository;

use chrono::{DateTime, Utc};

/// Parse a datetime string from the database, defaulting to Unix epoch
/// on error (timestamps are stored as RFC 3339 text, see `schema.rs`).
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(parse_datetime)
}
