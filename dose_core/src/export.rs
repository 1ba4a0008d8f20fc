//! CSV export of a patient's dose history.

use crate::{categorize, DoseFilter, DoseInstance, DoseLedger, Result};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    id: String,
    order_id: String,
    medication: String,
    category: String,
    dosage: String,
    scheduled_time: String,
    status: String,
    actual_time: Option<String>,
    notes: Option<String>,
    side_effects: String,
    logged_at: Option<String>,
}

impl CsvRow {
    /// `view` carries the status derived at export time
    fn new(view: &DoseInstance, ledger: &DoseLedger) -> Self {
        let order = ledger.order(&view.order_id);
        let medication = order.map(|o| o.name.clone()).unwrap_or_default();
        CsvRow {
            id: view.id.to_string(),
            order_id: view.order_id.clone(),
            category: categorize(&medication).to_string(),
            medication,
            dosage: order.map(|o| o.dosage_text.clone()).unwrap_or_default(),
            scheduled_time: view.scheduled_time.to_rfc3339(),
            status: view.status.to_string(),
            actual_time: view.actual_time.map(|t| t.to_rfc3339()),
            notes: view.notes.clone(),
            side_effects: view
                .side_effects
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(";"),
            logged_at: view.logged_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Write every dose instance matching `filter` to a CSV file
///
/// The file is replaced. Statuses are derived at `now`, so past-due pending
/// doses are exported as `overdue`. Returns the number of rows written.
pub fn export_csv(
    ledger: &DoseLedger,
    filter: &DoseFilter,
    now: DateTime<Utc>,
    csv_path: &Path,
) -> Result<usize> {
    if let Some(parent) = csv_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let doses = ledger.query(filter, now);
    let file = File::create(csv_path)?;
    let mut writer = csv::Writer::from_writer(file);

    for view in &doses {
        writer.serialize(CsvRow::new(view, ledger))?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    tracing::info!(
        "Exported {} doses for {} to {:?}",
        doses.len(),
        ledger.patient_id(),
        csv_path
    );
    Ok(doses.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DoseLog, DoseStatus, MedicationOrder, ScheduleSettings};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn ledger_with_history(now: DateTime<Utc>) -> DoseLedger {
        let order = MedicationOrder {
            id: "rx1_0".into(),
            prescription_id: "rx1".into(),
            name: "Amoxicillin".into(),
            dosage_text: "500mg".into(),
            frequency_text: "Twice daily".into(),
            start_date: ts("2024-01-15T00:00:00Z"),
            duration_days: Some(1),
            instructions: None,
        };
        let mut ledger = DoseLedger::new("p1", ScheduleSettings::default());
        let doses = ledger
            .materialize(&order, ts("2024-01-15T00:00:00Z"), 7)
            .unwrap();
        assert_eq!(doses.len(), 2);
        ledger
            .log_dose(
                doses[0].id,
                DoseLog::taken()
                    .with_side_effect("Nausea")
                    .with_side_effect("Headache"),
                now,
            )
            .unwrap();
        ledger
    }

    #[test]
    fn test_export_writes_all_doses() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("export").join("doses.csv");
        let now = ts("2024-01-15T22:00:00Z");

        let ledger = ledger_with_history(now);
        let count = export_csv(&ledger, &DoseFilter::default(), now, &csv_path).unwrap();
        assert_eq!(count, 2);

        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "id");
        assert_eq!(&headers[2], "medication");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][2], "Amoxicillin");
        assert_eq!(&rows[0][3], "Antibiotic");
        assert_eq!(&rows[0][6], "taken");
        assert_eq!(&rows[0][9], "Headache;Nausea");
        // 21:00 dose is past the grace window at 22:00
        assert_eq!(&rows[1][6], "overdue");
    }

    #[test]
    fn test_export_respects_filter() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("taken.csv");
        let now = ts("2024-01-15T22:00:00Z");

        let ledger = ledger_with_history(now);
        let filter = DoseFilter::default().with_status(DoseStatus::Taken);
        assert_eq!(export_csv(&ledger, &filter, now, &csv_path).unwrap(), 1);
    }

    #[test]
    fn test_export_replaces_existing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("doses.csv");
        let now = ts("2024-01-15T22:00:00Z");
        let ledger = ledger_with_history(now);

        export_csv(&ledger, &DoseFilter::default(), now, &csv_path).unwrap();
        export_csv(&ledger, &DoseFilter::default(), now, &csv_path).unwrap();

        let reader = csv::Reader::from_path(&csv_path).unwrap();
        assert_eq!(reader.into_records().count(), 2);
    }
}
