//! Activity Log Entry
//!
//! Recent-activity records shown on the dashboard. The log is a ring
//! buffer of the 20 most recent entries, newest first.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Maximum number of activity entries kept
pub const MAX_ACTIVITIES: usize = 20;

/// What kind of action an activity entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Add,
    Edit,
    Delete,
    Complete,
    Retry,
    Note,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Add => "add",
            ActivityKind::Edit => "edit",
            ActivityKind::Delete => "delete",
            ActivityKind::Complete => "complete",
            ActivityKind::Retry => "retry",
            ActivityKind::Note => "note",
        }
    }
}

/// One recent-activity record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub text: String,
    /// RFC 3339 UTC timestamp
    pub timestamp: String,
}

impl ActivityEntry {
    /// Create an entry stamped with the current time
    pub fn now(kind: ActivityKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Push an entry onto the front of the log, trimming to the cap
pub fn push_activity(log: &mut Vec<ActivityEntry>, entry: ActivityEntry) {
    log.insert(0, entry);
    log.truncate(MAX_ACTIVITIES);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_newest_first() {
        let mut log = Vec::new();
        push_activity(&mut log, ActivityEntry::now(ActivityKind::Add, "first"));
        push_activity(&mut log, ActivityEntry::now(ActivityKind::Edit, "second"));

        assert_eq!(log.len(), 2);
        assert_eq!(log[0].text, "second");
        assert_eq!(log[1].text, "first");
    }

    #[test]
    fn test_ring_caps_at_twenty() {
        let mut log = Vec::new();
        for i in 0..MAX_ACTIVITIES {
            push_activity(
                &mut log,
                ActivityEntry::now(ActivityKind::Add, format!("entry {}", i)),
            );
        }
        assert_eq!(log.len(), MAX_ACTIVITIES);
        assert_eq!(log.last().unwrap().text, "entry 0");

        push_activity(&mut log, ActivityEntry::now(ActivityKind::Note, "overflow"));
        assert_eq!(log.len(), MAX_ACTIVITIES);
        assert_eq!(log[0].text, "overflow");
        // Oldest entry dropped
        assert_eq!(log.last().unwrap().text, "entry 1");
    }

    #[test]
    fn test_serialized_shape() {
        let entry = ActivityEntry::now(ActivityKind::Complete, "Marked done");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["text"], "Marked done");
        assert!(json["timestamp"].is_string());
    }
}
