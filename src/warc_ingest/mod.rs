//! WARC discovery & reader (spec §4.E): locates a job's WARC files on
//! disk and streams HTML response records out of them.

mod discovery;
mod reader;

pub use discovery::discover_warcs;
pub use reader::{HtmlRecord, WarcHtmlReader};
