#![forbid(unsafe_code)]

//! Core domain model and scheduling logic for medication dose tracking.
//!
//! This crate provides:
//! - Domain types (orders, prescriptions, dose instances, adherence)
//! - Frequency resolution and recurrence generation
//! - The dose ledger and its lifecycle rules
//! - Next-dose and adherence views over the ledger
//! - Host adapters (prescription files, ledger snapshots, journal, CSV export)

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod frequency;
pub mod recurrence;
pub mod ledger;
pub mod next_dose;
pub mod adherence;
pub mod engine;
pub mod prescriptions;
pub mod state;
pub mod journal;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{canonical_side_effect, categorize, MedicationCategory};
pub use config::Config;
pub use frequency::{parse_duration_days, resolve_frequency};
pub use recurrence::generate_schedule;
pub use ledger::{DoseFilter, DoseLedger, LedgerSnapshot};
pub use next_dose::{format_countdown, resolve_next_dose, upcoming};
pub use adherence::compute_adherence;
pub use engine::DoseEngine;
pub use prescriptions::load_prescriptions;
pub use state::PatientLock;
pub use journal::{DoseLogEvent, EventSink, JsonlJournal};
pub use export::export_csv;
