//! Built-in medication vocabulary.
//!
//! Name-based medication categories and the side-effect list offered when a
//! dose is logged.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad therapeutic grouping shown next to a medication
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MedicationCategory {
    PainRelief,
    Antibiotic,
    Supplement,
    Digestive,
    Medicine,
}

impl fmt::Display for MedicationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MedicationCategory::PainRelief => "Pain Relief",
            MedicationCategory::Antibiotic => "Antibiotic",
            MedicationCategory::Supplement => "Supplement",
            MedicationCategory::Digestive => "Digestive",
            MedicationCategory::Medicine => "Medicine",
        };
        f.write_str(s)
    }
}

/// Name fragments per category, checked in order
static CATEGORY_KEYWORDS: Lazy<Vec<(MedicationCategory, &'static [&'static str])>> =
    Lazy::new(|| {
        vec![
            (
                MedicationCategory::PainRelief,
                &["paracetamol", "crocin", "dolo"][..],
            ),
            (
                MedicationCategory::Antibiotic,
                &["amoxicillin", "azithromycin", "augmentin"][..],
            ),
            (MedicationCategory::Supplement, &["vitamin", "calcium"][..]),
            (
                MedicationCategory::Digestive,
                &["antacid", "eno", "digene"][..],
            ),
        ]
    });

/// Side effects offered when logging a dose
pub static SIDE_EFFECTS: &[&str] = &[
    "Nausea",
    "Dizziness",
    "Headache",
    "Drowsiness",
    "Fatigue",
    "Stomach upset",
    "Dry mouth",
    "Sleep issues",
    "Other",
];

/// Classify a medication by name (case-insensitive substring match)
pub fn categorize(name: &str) -> MedicationCategory {
    let lower = name.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(MedicationCategory::Medicine)
}

/// Canonical spelling of a side effect; unknown values are kept trimmed
pub fn canonical_side_effect(raw: &str) -> String {
    let trimmed = raw.trim();
    SIDE_EFFECTS
        .iter()
        .find(|known| known.eq_ignore_ascii_case(trimmed))
        .map(|known| known.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}
