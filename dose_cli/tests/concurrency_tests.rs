//! Concurrency tests for the doses binary.
//!
//! These tests verify that multiple processes can safely:
//! - Race to log the same dose (exactly one wins)
//! - Log different doses without losing updates

use assert_cmd::Command;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::TempDir;

const PRESCRIPTIONS: &str = r#"[{
    "id": "rx1",
    "patient_id": "default",
    "status": "active",
    "created_at": "2024-01-15T00:00:00Z",
    "valid_until": null,
    "medications": [
        {
            "name": "Paracetamol",
            "dosage": "500mg",
            "frequency": "Every 6 hours",
            "duration": "3 days"
        }
    ]
}]"#;

fn setup_test_dir() -> TempDir {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    std::fs::write(temp_dir.path().join("prescriptions.json"), PRESCRIPTIONS)
        .expect("Failed to write prescriptions");
    temp_dir
}

fn cli(data_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("doses"));
    cmd.env("XDG_CONFIG_HOME", data_dir.join("config"))
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--now")
        .arg("2024-01-15T00:10:00Z");
    cmd
}

fn dose_id(scheduled: &str) -> String {
    let at = DateTime::parse_from_rfc3339(scheduled)
        .unwrap()
        .with_timezone(&Utc);
    dose_core::instance_id("rx1_0", at).to_string()
}

fn journal_lines(data_dir: &Path) -> usize {
    std::fs::read_to_string(data_dir.join("journal/dose_log.jsonl"))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

#[test]
fn test_racing_logs_have_one_winner() {
    let temp_dir = setup_test_dir();
    let data_dir: PathBuf = temp_dir.path().to_path_buf();
    let dose = dose_id("2024-01-15T12:00:00Z");

    let handles: Vec<_> = ["taken", "missed", "skipped", "taken", "taken", "missed"]
        .into_iter()
        .map(|status| {
            let data_dir = data_dir.clone();
            let dose = dose.clone();
            thread::spawn(move || {
                cli(&data_dir)
                    .args(["log", dose.as_str(), status])
                    .output()
                    .expect("Failed to run doses")
                    .status
                    .success()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .filter(|ok| *ok)
        .count();

    assert_eq!(winners, 1, "Expected exactly one successful log");
    assert_eq!(journal_lines(&data_dir), 1);
}

#[test]
fn test_concurrent_logs_of_different_doses() {
    let temp_dir = setup_test_dir();
    let data_dir: PathBuf = temp_dir.path().to_path_buf();

    let doses = [
        "2024-01-15T00:00:00Z",
        "2024-01-15T06:00:00Z",
        "2024-01-15T12:00:00Z",
        "2024-01-15T18:00:00Z",
    ];

    let handles: Vec<_> = doses
        .iter()
        .map(|at| {
            let data_dir = data_dir.clone();
            let dose = dose_id(at);
            thread::spawn(move || {
                cli(&data_dir)
                    .args(["log", dose.as_str(), "taken"])
                    .assert()
                    .success();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread panicked");
    }

    assert_eq!(journal_lines(&data_dir), 4);

    // Every log survived in the saved ledger
    let output = cli(&data_dir)
        .args(["adherence"])
        .output()
        .expect("Failed to run doses");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("taken 4 / missed 0 / skipped 0"),
        "unexpected report: {}",
        stdout
    );
}
