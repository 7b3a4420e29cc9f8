//! Town audit trail of nudges, one JSON object per line in
//! `<root>/logs/nudges.jsonl`.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GtError, Result};
use crate::town::Town;

const NUDGE_LOG: &str = "nudges.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NudgeEntry {
    pub at: DateTime<Utc>,
    pub from: String,
    /// Target as the caller wrote it.
    pub target: String,
    pub session: String,
    pub message: String,
}

pub struct NudgeLog {
    path: PathBuf,
}

impl NudgeLog {
    pub fn for_town(town: &Town) -> Self {
        Self {
            path: town.log_dir().join(NUDGE_LOG),
        }
    }

    /// Append one entry. Each entry is written with a single `write` so
    /// concurrent appenders do not interleave lines.
    pub fn append(&self, entry: &NudgeEntry) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| GtError::io(format!("creating {}", dir.display()), e))?;
        }
        let mut line = serde_json::to_string(entry)
            .map_err(|e| GtError::Config(format!("encoding nudge entry: {e}")))?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| GtError::io(format!("opening {}", self.path.display()), e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| GtError::io(format!("appending to {}", self.path.display()), e))
    }

    /// Entries oldest first. Lines that do not parse are skipped.
    pub fn entries(&self) -> Result<Vec<NudgeEntry>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(GtError::io(format!("reading {}", self.path.display()), e)),
        };
        Ok(text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str(l) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed nudge log line");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::town::testing::sample_town;

    fn entry(target: &str, message: &str) -> NudgeEntry {
        NudgeEntry {
            at: Utc::now(),
            from: "mayor".into(),
            target: target.into(),
            session: format!("gt-{}", target.replace('/', "-")),
            message: message.into(),
        }
    }

    #[test]
    fn appends_jsonl_under_town_logs() {
        let dir = tempfile::tempdir().unwrap();
        let log = NudgeLog::for_town(&sample_town(dir.path()));
        assert!(log.entries().unwrap().is_empty());

        log.append(&entry("wyvern/Toast", "check mail")).unwrap();
        log.append(&entry("deacon", "patrol\nnow")).unwrap();

        let text = fs::read_to_string(dir.path().join("logs/nudges.jsonl")).unwrap();
        assert_eq!(text.lines().count(), 2, "embedded newlines stay escaped");
        let entries = log.entries().unwrap();
        assert_eq!(entries[0].target, "wyvern/Toast");
        assert_eq!(entries[1].message, "patrol\nnow");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = NudgeLog::for_town(&sample_town(dir.path()));
        log.append(&entry("mayor", "hi")).unwrap();
        let path = dir.path().join("logs/nudges.jsonl");
        let mut text = fs::read_to_string(&path).unwrap();
        text.push_str("{truncated\n");
        fs::write(&path, text).unwrap();
        assert_eq!(log.entries().unwrap().len(), 1);
    }
}
