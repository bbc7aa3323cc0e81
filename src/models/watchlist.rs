use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::CourseSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub course_code: String,
    /// Lower is scanned first. Always >= 1.
    pub priority: u32,
    pub auto_register: bool,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddWatchRequest {
    pub course_code: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub auto_register: bool,
}

fn default_priority() -> u32 {
    1
}

/// A watchlist entry joined with its latest snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct WatchStatus {
    #[serde(flatten)]
    pub entry: WatchlistEntry,
    pub snapshot: Option<CourseSnapshot>,
    pub available: bool,
}

impl WatchStatus {
    pub fn new(entry: WatchlistEntry, snapshot: Option<CourseSnapshot>) -> Self {
        let available = snapshot.as_ref().is_some_and(|s| s.has_open_seats());
        Self {
            entry,
            snapshot,
            available,
        }
    }
}
