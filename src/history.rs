//! Append-only cache event history.
//!
//! Every HIT, STORE, and CLEAR event is appended as one JSON object per
//! line to `history.log` in the cache directory. The log is never
//! truncated by the cache itself — `clear()` appends a CLEAR record
//! rather than rewriting the file — so it doubles as an audit trail.
//! Hosts query recent entries by limit and export them as JSON or CSV.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CacheError, Result};
use crate::stats::round_to;

/// File name of the history log, under the cache directory.
pub const HISTORY_FILE: &str = "history.log";

/// Cache event categories recorded in the history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HistoryAction {
    Hit,
    Store,
    Clear,
}

/// One history event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// RFC 3339 UTC instant of the event.
    pub timestamp: String,
    pub prompt: String,
    /// Similarity at the event, rounded to 4 decimal places. `1.0` for
    /// STORE, `0.0` for CLEAR.
    pub similarity: f32,
    pub action: HistoryAction,
}

/// Append-only NDJSON event log.
///
/// Appends are serialized by a mutex so concurrent events interleave at
/// record granularity; reads open the file fresh each time.
#[derive(Debug)]
pub struct HistoryLog {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl HistoryLog {
    /// Create a log writing to `dir/history.log`. The file is created
    /// on first append.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(HISTORY_FILE),
            append_lock: Mutex::new(()),
        }
    }

    /// Append one event. The timestamp is taken now, in UTC.
    pub fn append(&self, prompt: &str, similarity: f32, action: HistoryAction) -> Result<()> {
        let record = HistoryRecord {
            timestamp: Utc::now().to_rfc3339(),
            prompt: prompt.to_string(),
            similarity: round_to(similarity as f64, 4) as f32,
            action,
        };
        let line = serde_json::to_string(&record)?;

        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::Persist(format!(
                    "failed to create history dir {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                CacheError::Persist(format!(
                    "failed to open history log {}: {e}",
                    self.path.display()
                ))
            })?;
        writeln!(file, "{line}").map_err(|e| {
            CacheError::Persist(format!(
                "failed to append to history log {}: {e}",
                self.path.display()
            ))
        })?;
        Ok(())
    }

    /// The most recent `limit` events, oldest first.
    ///
    /// A missing log yields an empty vec; unparseable lines are skipped
    /// with a warning (a crash mid-append can leave one torn line).
    pub fn recent(&self, limit: usize) -> Vec<HistoryRecord> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read history log");
                return Vec::new();
            }
        };

        let mut records: Vec<HistoryRecord> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "skipping unparseable history line");
                    None
                }
            })
            .collect();

        if records.len() > limit {
            records.drain(..records.len() - limit);
        }
        records
    }

    /// The most recent `limit` events as a pretty-printed JSON array.
    pub fn export_json(&self, limit: usize) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.recent(limit))?)
    }

    /// The most recent `limit` events as CSV with a header row.
    ///
    /// Prompts are quoted, with embedded quotes doubled per RFC 4180.
    pub fn export_csv(&self, limit: usize) -> String {
        let mut out = String::from("timestamp,prompt,similarity,action\n");
        for record in self.recent(limit) {
            let action = match record.action {
                HistoryAction::Hit => "HIT",
                HistoryAction::Store => "STORE",
                HistoryAction::Clear => "CLEAR",
            };
            out.push_str(&format!(
                "{},{},{},{}\n",
                csv_field(&record.timestamp),
                csv_field(&record.prompt),
                record.similarity,
                action
            ));
        }
        out
    }
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_then_recent_round_trip() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path());

        log.append("how do I sort a list", 0.92, HistoryAction::Hit)
            .unwrap();
        log.append("what is rust", 1.0, HistoryAction::Store).unwrap();

        let records = log.recent(10);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, HistoryAction::Hit);
        assert_eq!(records[0].similarity, 0.92);
        assert_eq!(records[1].prompt, "what is rust");
    }

    #[test]
    fn recent_respects_limit_keeping_newest() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path());
        for i in 0..5 {
            log.append(&format!("prompt {i}"), 1.0, HistoryAction::Store)
                .unwrap();
        }

        let records = log.recent(2);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].prompt, "prompt 3");
        assert_eq!(records[1].prompt, "prompt 4");
    }

    #[test]
    fn missing_log_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path());
        assert!(log.recent(10).is_empty());
    }

    #[test]
    fn torn_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path());
        log.append("first prompt here", 0.9, HistoryAction::Hit)
            .unwrap();

        // Simulate a crash mid-append.
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join(HISTORY_FILE))
            .unwrap();
        writeln!(file, "{{\"timestamp\": \"2026-01-").unwrap();

        assert_eq!(log.recent(10).len(), 1);
    }

    #[test]
    fn similarity_is_rounded() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path());
        log.append("a b c", 0.123456, HistoryAction::Hit).unwrap();
        assert_eq!(log.recent(1)[0].similarity, 0.1235);
    }

    #[test]
    fn action_serializes_uppercase() {
        let json = serde_json::to_string(&HistoryAction::Store).unwrap();
        assert_eq!(json, r#""STORE""#);
    }

    #[test]
    fn csv_export_quotes_awkward_prompts() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path());
        log.append("tell me, \"why\"", 1.0, HistoryAction::Store)
            .unwrap();

        let csv = log.export_csv(10);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("timestamp,prompt,similarity,action"));
        let row = lines.next().unwrap();
        assert!(row.contains(r#""tell me, ""why""""#));
        assert!(row.ends_with("1,STORE"));
    }

    #[test]
    fn json_export_is_an_array() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path());
        log.append("some prompt text", 0.0, HistoryAction::Clear)
            .unwrap();

        let parsed: Vec<HistoryRecord> =
            serde_json::from_str(&log.export_json(10).unwrap()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].action, HistoryAction::Clear);
    }
}
