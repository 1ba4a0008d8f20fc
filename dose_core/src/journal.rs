//! Append-only dose-log journal.
//!
//! Every successful dose log is appended to a JSONL (JSON Lines) file with
//! file locking, giving an audit trail independent of the ledger snapshot.

use crate::{DoseInstance, DoseStatus, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One logged dose outcome
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoseLogEvent {
    pub patient_id: String,
    pub instance_id: Uuid,
    pub order_id: String,
    pub scheduled_time: DateTime<Utc>,
    pub status: DoseStatus,
    pub actual_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    #[serde(default)]
    pub side_effects: BTreeSet<String>,
    pub logged_at: DateTime<Utc>,
}

impl DoseLogEvent {
    /// Event for a freshly logged instance
    pub fn from_instance(
        patient_id: &str,
        instance: &DoseInstance,
        logged_at: DateTime<Utc>,
    ) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            instance_id: instance.id,
            order_id: instance.order_id.clone(),
            scheduled_time: instance.scheduled_time,
            status: instance.status,
            actual_time: instance.actual_time,
            notes: instance.notes.clone(),
            side_effects: instance.side_effects.clone(),
            logged_at: instance.logged_at.unwrap_or(logged_at),
        }
    }
}

/// Sink for dose-log events
pub trait EventSink {
    fn append(&mut self, event: &DoseLogEvent) -> Result<()>;
}

/// JSONL-based journal with file locking
pub struct JsonlJournal {
    path: PathBuf,
}

impl JsonlJournal {
    /// Create a journal writing to the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl EventSink for JsonlJournal {
    fn append(&mut self, event: &DoseLogEvent) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(event)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        tracing::debug!("Journaled dose {} as {}", event.instance_id, event.status);
        Ok(())
    }
}

/// Read all events from a journal file, skipping unreadable lines
pub fn read_events(path: &Path) -> Result<Vec<DoseLogEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut events = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<DoseLogEvent>(&line) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!("Failed to parse journal entry at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} events from journal", events.len());
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_event(status: DoseStatus) -> DoseLogEvent {
        let scheduled = DateTime::parse_from_rfc3339("2024-01-15T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut instance = DoseInstance::pending("rx1_0", scheduled);
        instance.status = status;
        instance.side_effects.insert("Headache".into());
        DoseLogEvent::from_instance("p1", &instance, scheduled)
    }

    #[test]
    fn test_append_and_read_events() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("journal").join("dose_log.jsonl");

        let mut journal = JsonlJournal::new(&path);
        journal.append(&create_test_event(DoseStatus::Taken)).unwrap();
        journal.append(&create_test_event(DoseStatus::Missed)).unwrap();

        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, DoseStatus::Taken);
        assert_eq!(events[1].status, DoseStatus::Missed);
        assert!(events[0].side_effects.contains("Headache"));
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("dose_log.jsonl");

        let mut journal = JsonlJournal::new(&path);
        journal.append(&create_test_event(DoseStatus::Taken)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{ not json").unwrap();
        journal.append(&create_test_event(DoseStatus::Skipped)).unwrap();

        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_read_missing_journal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let events = read_events(&temp_dir.path().join("none.jsonl")).unwrap();
        assert!(events.is_empty());
    }
}
