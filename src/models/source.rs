use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A logical content origin (spec §3 "Source").
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: String,
    pub code: String,
    pub name: String,
    pub base_url: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    pub fn new(code: impl Into<String>, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Source {
            id: Uuid::new_v4().to_string(),
            code: code.into(),
            name: name.into(),
            base_url: base_url.into(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}
