//! HealthArchive — preservation, indexing, and search for archived
//! Canadian government health web pages.
//!
//! The crawler that produces WARC captures is an external process; this
//! crate owns the job lifecycle around it, the WARC-to-`Snapshot`
//! indexing pipeline, change tracking between captures, and the search
//! engine that serves results over HTTP.

pub mod change_tracker;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod index;
pub mod models;
pub mod registry;
pub mod repository;
pub mod runner;
pub mod safety;
pub mod schema;
pub mod search;
pub mod server;
pub mod urlnorm;
pub mod warc_ingest;
pub mod worker;

pub use error::{HaError, HaResult};
