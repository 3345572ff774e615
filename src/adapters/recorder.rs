//! JSON-lines decision recorder
//!
//! Appends one JSON object per decision. The file is opened in append mode
//! so restarts never truncate history.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::domain::TradeDecision;
use crate::ports::{DecisionRecorder, RecorderError};

#[derive(Debug)]
pub struct JsonlRecorder {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlRecorder {
    /// Open (or create) `path`, creating parent directories as needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DecisionRecorder for JsonlRecorder {
    fn record(&self, decision: &TradeDecision) -> Result<(), RecorderError> {
        let line = serde_json::to_string(decision)?;
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }
}

/// Read a decision file back (offline analysis, tests)
pub fn read_decisions(path: impl AsRef<Path>) -> Result<Vec<TradeDecision>, RecorderError> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(RecorderError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountState, DecisionDraft, DecisionOutcome, RegimeSnapshot};
    use chrono::Utc;

    fn decision(code: &str) -> TradeDecision {
        let snapshot = RegimeSnapshot::initial(Utc::now());
        DecisionDraft::start("EURUSD", &snapshot, 1.1, AccountState::default(), Utc::now())
            .rejected(code, "no range")
    }

    #[test]
    fn test_appends_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("decisions.jsonl");

        let recorder = JsonlRecorder::open(&path).unwrap();
        recorder.record(&decision("no_range")).unwrap();
        drop(recorder);

        let recorder = JsonlRecorder::open(&path).unwrap();
        recorder.record(&decision("range_too_narrow")).unwrap();

        let decisions = read_decisions(&path).unwrap();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].reason_code.as_deref(), Some("no_range"));
        assert_eq!(decisions[1].outcome, DecisionOutcome::Rejected);
    }

    #[test]
    fn test_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        let recorder = JsonlRecorder::open(&path).unwrap();
        recorder.record(&decision("no_range")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(value["outcome"], "REJECTED");
        assert_eq!(value["symbol"], "EURUSD");
    }
}
