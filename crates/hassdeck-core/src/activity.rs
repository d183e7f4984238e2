// ── Activity log ──
//
// A short, newest-first history of what the dashboard did, shown in the
// log panel and persisted between runs under the `logs` key.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Most entries kept; older ones fall off the end.
pub const ACTIVITY_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub time: DateTime<Utc>,
    pub message: String,
}

/// Bounded, newest-first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityLog(VecDeque<ActivityEntry>);

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a persisted log, trimming anything past capacity.
    pub fn from_entries(entries: impl IntoIterator<Item = ActivityEntry>) -> Self {
        Self(entries.into_iter().take(ACTIVITY_CAPACITY).collect())
    }

    pub fn record(&mut self, message: impl Into<String>) {
        self.push(ActivityEntry {
            time: Utc::now(),
            message: message.into(),
        });
    }

    pub fn push(&mut self, entry: ActivityEntry) {
        self.0.push_front(entry);
        self.0.truncate(ACTIVITY_CAPACITY);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.0.iter()
    }

    pub fn to_vec(&self) -> Vec<ActivityEntry> {
        self.0.iter().cloned().collect()
    }
}
