//! Performance history file
//!
//! A JSON array of [`HistoryEntry`] records, one appended per analyzed
//! target. Writes go through a temporary sibling file and a rename so an
//! interrupted run never leaves a truncated history behind.

use crate::error::HistoryError;
use crate::result::{ExecutionResult, ExecutionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub target: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub status: ExecutionStatus,
    pub execution_time_secs: f64,
    pub peak_memory_bytes: u64,
}

impl HistoryEntry {
    pub fn from_result(result: &ExecutionResult) -> Self {
        Self {
            timestamp: result.started_at,
            target: result.target.path().to_path_buf(),
            test: result.target.test().map(str::to_string),
            fingerprint: result.target.fingerprint().map(str::to_string),
            status: result.status,
            execution_time_secs: result.summary.execution_time_secs,
            peak_memory_bytes: result.summary.peak_memory_bytes,
        }
    }
}

/// History file accessor
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries; a missing file is an empty history
    pub fn load(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(HistoryError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).map_err(|source| HistoryError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    pub fn append(&self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut history = self.load()?;
        history.extend_from_slice(entries);

        let io_err = |source| HistoryError::Io {
            path: self.path.clone(),
            source,
        };
        let text = serde_json::to_string_pretty(&history).map_err(|source| {
            HistoryError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, text).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;

        tracing::debug!(
            path = %self.path.display(),
            appended = entries.len(),
            total = history.len(),
            "history updated"
        );
        Ok(())
    }

    /// Entries recorded for one target file, oldest first
    pub fn entries_for(&self, target: &Path) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut entries: Vec<HistoryEntry> = self
            .load()?
            .into_iter()
            .filter(|e| e.target == target)
            .collect();
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }
}

/// Text table of a target's history
pub fn render_table(target: &Path, entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return format!("No history data available for {}", target.display());
    }

    let mut out = format!("=== Performance History: {} ===\n", target.display());
    out.push_str(&format!(
        "{:<25} {:<10} {:<12} {:>12} {:>14}\n",
        "timestamp", "status", "source", "time (s)", "memory (MB)"
    ));
    for entry in entries {
        let source = entry
            .fingerprint
            .as_deref()
            .map(|f| &f[..f.len().min(10)])
            .unwrap_or("-");
        out.push_str(&format!(
            "{:<25} {:<10} {:<12} {:>12.3} {:>14.2}\n",
            entry.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
            entry.status.as_str(),
            source,
            entry.execution_time_secs,
            entry.peak_memory_bytes as f64 / (1024.0 * 1024.0)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(target: &str, secs: i64, time: f64) -> HistoryEntry {
        HistoryEntry {
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            target: PathBuf::from(target),
            test: None,
            fingerprint: Some("0123456789abcdef".to_string()),
            status: ExecutionStatus::Success,
            execution_time_secs: time,
            peak_memory_bytes: 2 * 1024 * 1024,
        }
    }

    #[test]
    fn test_missing_history_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_append_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        store.append(&[entry("/t/a.py", 0, 1.0)]).unwrap();
        store
            .append(&[entry("/t/b.py", 1, 2.0), entry("/t/a.py", 2, 0.5)])
            .unwrap();

        assert_eq!(store.load().unwrap().len(), 3);
        let a = store.entries_for(Path::new("/t/a.py")).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[1].execution_time_secs, 0.5);
        assert!(!dir.path().join("history.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_history_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = HistoryStore::new(&path).load().unwrap_err();
        assert!(matches!(err, HistoryError::Corrupt { .. }));
    }

    #[test]
    fn test_render_table() {
        let text = render_table(
            Path::new("/t/a.py"),
            &[entry("/t/a.py", 0, 1.25)],
        );
        assert!(text.starts_with("=== Performance History: /t/a.py ==="));
        assert!(text.contains("2023-11-14T22:13:20Z"));
        assert!(text.contains("0123456789"));
        assert!(text.contains("1.250"));
        assert!(text.contains("2.00"));

        assert_eq!(
            render_table(Path::new("/t/none.py"), &[]),
            "No history data available for /t/none.py"
        );
    }
}
