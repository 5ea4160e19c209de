use chrono::{DateTime, Utc};

/// Per-page-group authority signal, used only as a small tie-break in
/// ranking (spec §3 "PageSignal").
#[derive(Debug, Clone)]
pub struct PageSignal {
    pub normalized_url_group: String,
    pub inlink_count: i32,
    pub updated_at: DateTime<Utc>,
}
