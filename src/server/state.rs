//! Shared HTTP server state (spec §6).
//!
//! Grounded on the teacher's `server/mod.rs` `AppState` shape
//! (Arc-wrapped repositories plus a small mutable cache), generalized
//! from the document-browsing repos to a `DbContext` over
//! HealthArchive's own entities and the settings needed to gate the
//! admin surface.

use std::sync::Arc;

use crate::config::Settings;
use crate::repository::DbContext;

use super::cache::StatsCache;

/// State shared across every HTTP handler. Cheap to clone — `DbContext`
/// wraps a connection pool, and `Settings`/`StatsCache` are behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub ctx: DbContext,
    pub settings: Arc<Settings>,
    pub stats_cache: Arc<StatsCache>,
}

impl AppState {
    pub fn new(ctx: DbContext, settings: Settings) -> Self {
        AppState {
            ctx,
            settings: Arc::new(settings),
            stats_cache: Arc::new(StatsCache::new()),
        }
    }

    /// True when the caller's bearer token matches the configured
    /// `ADMIN_TOKEN` (spec §6 "Admin surface (token-gated)").
    pub fn admin_token_matches(&self, presented: Option<&str>) -> bool {
        match &self.settings.admin_token {
            Some(expected) => presented.map(|p| p == expected).unwrap_or(false),
            None => !self.settings.environment.requires_admin_token(),
        }
    }
}
