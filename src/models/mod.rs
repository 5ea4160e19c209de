//! Domain models for HealthArchive (spec §3).

mod job;
mod page_signal;
mod snapshot;
mod source;
mod tool_options;

pub use job::{ArchiveJob, CleanupStatus, CrawlerStatus, JobConfig, JobStatus};
pub use page_signal::PageSignal;
pub use snapshot::{Language, Snapshot, SnapshotChange};
pub use source::Source;
pub use tool_options::ToolOptions;
