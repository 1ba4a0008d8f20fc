//! Prescription file loader.
//!
//! Prescriptions are authored by another system and exported as JSON, either
//! as a bare array or wrapped as `{"prescriptions": [...]}`. Medication
//! durations arrive as free text and are converted here.

use crate::{
    parse_duration_days, MedicationOrder, Prescription, PrescriptionStatus, Result,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

/// Prescription file format (matches the authoring system's export)
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PrescriptionFile {
    List(Vec<PrescriptionRecord>),
    Wrapped { prescriptions: Vec<PrescriptionRecord> },
}

#[derive(Debug, Deserialize)]
struct PrescriptionRecord {
    #[serde(alias = "_id")]
    id: String,
    patient_id: String,
    #[serde(default)]
    diagnosis: String,
    status: PrescriptionStatus,
    created_at: DateTime<Utc>,
    valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    medications: Vec<MedicationRecord>,
}

#[derive(Debug, Deserialize)]
struct MedicationRecord {
    id: Option<String>,
    name: String,
    #[serde(default)]
    dosage: String,
    frequency: String,
    duration: Option<String>,
    duration_days: Option<u32>,
    instructions: Option<String>,
    start_date: Option<DateTime<Utc>>,
}

impl From<PrescriptionRecord> for Prescription {
    fn from(record: PrescriptionRecord) -> Self {
        let medications = record
            .medications
            .into_iter()
            .enumerate()
            .map(|(index, med)| MedicationOrder {
                id: med
                    .id
                    .unwrap_or_else(|| format!("{}_{}", record.id, index)),
                prescription_id: record.id.clone(),
                name: med.name,
                dosage_text: med.dosage,
                frequency_text: med.frequency,
                start_date: med.start_date.unwrap_or(record.created_at),
                duration_days: med
                    .duration_days
                    .or_else(|| med.duration.as_deref().and_then(parse_duration_days)),
                instructions: med.instructions,
            })
            .collect();

        Prescription {
            id: record.id,
            patient_id: record.patient_id,
            diagnosis: record.diagnosis,
            status: record.status,
            created_at: record.created_at,
            valid_until: record.valid_until,
            medications,
        }
    }
}

/// Parse prescriptions from JSON text
pub fn parse_prescriptions(json: &str) -> Result<Vec<Prescription>> {
    let records = match serde_json::from_str::<PrescriptionFile>(json)? {
        PrescriptionFile::List(records) => records,
        PrescriptionFile::Wrapped { prescriptions } => prescriptions,
    };
    Ok(records.into_iter().map(Prescription::from).collect())
}

/// Load prescriptions from a JSON file
///
/// Returns an empty list if the file doesn't exist (nothing prescribed yet).
/// Returns an error if the file exists but is malformed, since silently
/// dropping a prescription would hide doses.
pub fn load_prescriptions(path: &Path) -> Result<Vec<Prescription>> {
    if !path.exists() {
        tracing::debug!("No prescription file found at {:?}", path);
        return Ok(Vec::new());
    }

    let contents = std::fs::read_to_string(path)?;
    let prescriptions = parse_prescriptions(&contents)?;

    tracing::info!(
        "Loaded {} prescriptions from {:?}",
        prescriptions.len(),
        path
    );
    Ok(prescriptions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"{
        "prescriptions": [
            {
                "_id": "rx1",
                "patient_id": "p1",
                "diagnosis": "Common Cold",
                "status": "active",
                "created_at": "2024-01-15T08:00:00Z",
                "valid_until": "2024-02-15T00:00:00Z",
                "medications": [
                    {
                        "name": "Paracetamol",
                        "dosage": "500mg",
                        "frequency": "Every 6 hours",
                        "duration": "3-5 days",
                        "instructions": "After meals"
                    },
                    {
                        "id": "cetirizine",
                        "name": "Cetirizine",
                        "dosage": "10mg",
                        "frequency": "Once daily",
                        "duration": "ongoing",
                        "start_date": "2024-01-16T00:00:00Z"
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_wrapped_export() {
        let prescriptions = parse_prescriptions(EXPORT).unwrap();
        assert_eq!(prescriptions.len(), 1);

        let rx = &prescriptions[0];
        assert_eq!(rx.id, "rx1");
        assert_eq!(rx.status, PrescriptionStatus::Active);
        assert_eq!(rx.medications.len(), 2);

        let paracetamol = &rx.medications[0];
        assert_eq!(paracetamol.id, "rx1_0");
        assert_eq!(paracetamol.prescription_id, "rx1");
        assert_eq!(paracetamol.duration_days, Some(5));
        assert_eq!(paracetamol.start_date, rx.created_at);

        let cetirizine = &rx.medications[1];
        assert_eq!(cetirizine.id, "cetirizine");
        assert_eq!(cetirizine.duration_days, None);
        assert_ne!(cetirizine.start_date, rx.created_at);
    }

    #[test]
    fn test_parse_bare_array() {
        let json = r#"[{
            "id": "rx2",
            "patient_id": "p1",
            "status": "cancelled",
            "created_at": "2024-01-15T08:00:00Z",
            "valid_until": null,
            "medications": [
                {"name": "Amoxicillin", "frequency": "Twice daily", "duration_days": 7}
            ]
        }]"#;

        let prescriptions = parse_prescriptions(json).unwrap();
        assert_eq!(prescriptions[0].status, PrescriptionStatus::Cancelled);
        assert_eq!(prescriptions[0].medications[0].duration_days, Some(7));
        assert_eq!(prescriptions[0].medications[0].dosage_text, "");
    }

    #[test]
    fn test_load_nonexistent_returns_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("prescriptions.json");

        assert!(load_prescriptions(&path).unwrap().is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("prescriptions.json");
        std::fs::write(&path, EXPORT).unwrap();

        let prescriptions = load_prescriptions(&path).unwrap();
        assert_eq!(prescriptions[0].medications.len(), 2);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("prescriptions.json");
        std::fs::write(&path, "{ invalid json }").unwrap();

        assert!(matches!(
            load_prescriptions(&path),
            Err(crate::Error::Json(_))
        ));
    }
}
