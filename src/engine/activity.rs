use super::lifecycle::InvestigationLog;
use crate::output;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Per-opportunity bookkeeping: when it was first seen and, when appearance
/// investigation is enabled, the not-yet-finalized appearance log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub first_seen: DateTime<Utc>,
    #[serde(default)]
    pub appearance_log: Option<InvestigationLog>,
}

/// Tracks how long each opportunity has been alive across cycles.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    entries: BTreeMap<String, ActivityEntry>,
}

impl ActivityTracker {
    pub fn load(path: &Path) -> Self {
        Self { entries: output::load_json_or_default(path) }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        output::write_json_atomic(path, &self.entries)
    }

    pub fn first_seen(&self, unique_id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(unique_id).map(|e| e.first_seen)
    }

    /// Register a sighting. New opportunities start their clock at `birth`;
    /// known ones keep their original first-seen stamp. Returns the stamp
    /// the duration should be measured from.
    pub fn record_seen(&mut self, unique_id: &str, birth: DateTime<Utc>) -> DateTime<Utc> {
        self.entries
            .entry(unique_id.to_string())
            .or_insert_with(|| ActivityEntry { first_seen: birth, appearance_log: None })
            .first_seen
    }

    pub fn appearance_log(&self, unique_id: &str) -> Option<&InvestigationLog> {
        self.entries.get(unique_id)?.appearance_log.as_ref()
    }

    pub fn set_appearance_log(&mut self, unique_id: &str, log: InvestigationLog) {
        if let Some(entry) = self.entries.get_mut(unique_id) {
            entry.appearance_log = Some(log);
        }
    }

    pub fn remove(&mut self, unique_id: &str) -> Option<ActivityEntry> {
        self.entries.remove(unique_id)
    }

    /// Drop entries that were not seen this cycle, except those still
    /// holding an unfinalized appearance log.
    pub fn prune(&mut self, seen_this_run: &BTreeSet<String>) {
        self.entries
            .retain(|uid, entry| seen_this_run.contains(uid) || entry.appearance_log.is_some());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Humanize a duration: seconds below a minute, then minutes, then hours.
pub fn format_duration(total_seconds: f64) -> String {
    if total_seconds < 60.0 {
        return format!("{} seconds", total_seconds.round() as i64);
    }
    let minutes = (total_seconds / 60.0).round() as i64;
    if minutes < 60 {
        return if minutes == 1 {
            "1 minute".to_string()
        } else {
            format!("{minutes} minutes")
        };
    }
    let hours = (minutes as f64 / 60.0).round() as i64;
    if hours == 1 {
        "1 hour".to_string()
    } else {
        format!("{hours} hours")
    }
}
