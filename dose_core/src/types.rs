//! Core domain types for medication dose scheduling.
//!
//! This module defines the fundamental types used throughout the system:
//! - Medication orders and the prescriptions that own them
//! - Canonical recurrence rules
//! - Dose instances and their lifecycle status
//! - Read-only views (next dose, adherence snapshot)
//! - Scheduling settings shared by every clock-dependent computation

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Orders and Prescriptions
// ============================================================================

/// One line item of a prescription
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MedicationOrder {
    pub id: String,
    pub prescription_id: String,
    pub name: String,
    /// Display only, never parsed
    pub dosage_text: String,
    pub frequency_text: String,
    pub start_date: DateTime<Utc>,
    /// `None` means indefinite
    pub duration_days: Option<u32>,
    pub instructions: Option<String>,
}

impl MedicationOrder {
    /// Exclusive end of the active window, if the order is time-limited
    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        self.duration_days
            .map(|days| self.start_date + Duration::days(i64::from(days)))
    }

    /// Whether the order's own window has elapsed at `now`
    pub fn window_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.end_date().map_or(false, |end| now >= end)
    }
}

/// Lifecycle status of a prescription
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    Active,
    Completed,
    Cancelled,
}

/// A prescription as authored elsewhere, owning one or more orders
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub diagnosis: String,
    pub status: PrescriptionStatus,
    pub created_at: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub medications: Vec<MedicationOrder>,
}

impl Prescription {
    /// Active means status `active` and not past `valid_until`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == PrescriptionStatus::Active
            && self.valid_until.map_or(true, |until| until > now)
    }
}

// ============================================================================
// Recurrence Rules
// ============================================================================

/// Canonical recurrence rule derived from an order's frequency text
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrequencySpec {
    /// Fixed local times of day, ascending
    FixedTimesPerDay { times: Vec<NaiveTime> },
    /// Every `n` hours, aligned to local midnight
    IntervalHours { n: u32 },
    /// Text could not be classified; scheduled like `IntervalHours`
    Unrecognized { fallback_interval_hours: u32 },
}

// ============================================================================
// Dose Instances
// ============================================================================

/// Lifecycle status of a dose instance
///
/// `Overdue` is never stored; it is derived from a pending instance and the
/// current time.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DoseStatus {
    Pending,
    Overdue,
    Taken,
    Missed,
    Skipped,
}

impl DoseStatus {
    /// Taken, missed and skipped are final
    pub fn is_terminal(self) -> bool {
        matches!(self, DoseStatus::Taken | DoseStatus::Missed | DoseStatus::Skipped)
    }

    /// Pending and overdue doses can still be logged
    pub fn is_actionable(self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DoseStatus::Pending => "pending",
            DoseStatus::Overdue => "overdue",
            DoseStatus::Taken => "taken",
            DoseStatus::Missed => "missed",
            DoseStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for DoseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for DoseStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(DoseStatus::Pending),
            "overdue" => Ok(DoseStatus::Overdue),
            "taken" => Ok(DoseStatus::Taken),
            "missed" => Ok(DoseStatus::Missed),
            "skipped" => Ok(DoseStatus::Skipped),
            other => Err(crate::Error::InvalidStatus(other.to_string())),
        }
    }
}

/// One scheduled occurrence of an order
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoseInstance {
    pub id: Uuid,
    pub order_id: String,
    pub scheduled_time: DateTime<Utc>,
    pub status: DoseStatus,
    /// Set only when taken
    pub actual_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    #[serde(default)]
    pub side_effects: BTreeSet<String>,
    pub logged_at: Option<DateTime<Utc>>,
}

impl DoseInstance {
    /// Fresh pending instance with an id derived from `(order_id, scheduled_time)`
    pub fn pending(order_id: &str, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            id: instance_id(order_id, scheduled_time),
            order_id: order_id.to_string(),
            scheduled_time,
            status: DoseStatus::Pending,
            actual_time: None,
            notes: None,
            side_effects: BTreeSet::new(),
            logged_at: None,
        }
    }

    /// Status as seen at `now`: pending past the grace window reads as overdue.
    ///
    /// The flip happens strictly after `scheduled_time + grace`.
    pub fn status_at(&self, now: DateTime<Utc>, grace: Duration) -> DoseStatus {
        match self.status {
            DoseStatus::Pending | DoseStatus::Overdue if now > self.scheduled_time + grace => {
                DoseStatus::Overdue
            }
            DoseStatus::Pending | DoseStatus::Overdue => DoseStatus::Pending,
            terminal => terminal,
        }
    }

    /// Copy of this instance with its status derived at `now`
    pub fn view_at(&self, now: DateTime<Utc>, grace: Duration) -> DoseInstance {
        DoseInstance {
            status: self.status_at(now, grace),
            ..self.clone()
        }
    }
}

/// Deterministic instance id, stable across processes
pub fn instance_id(order_id: &str, scheduled_time: DateTime<Utc>) -> Uuid {
    let key = format!("{}@{}", order_id, scheduled_time.timestamp());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}

/// A terminal log request for one dose instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DoseLog {
    pub status: DoseStatus,
    pub actual_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub side_effects: BTreeSet<String>,
}

impl DoseLog {
    pub fn new(status: DoseStatus) -> Self {
        Self {
            status,
            actual_time: None,
            notes: None,
            side_effects: BTreeSet::new(),
        }
    }

    pub fn taken() -> Self {
        Self::new(DoseStatus::Taken)
    }

    pub fn at(mut self, actual_time: DateTime<Utc>) -> Self {
        self.actual_time = Some(actual_time);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_side_effect(mut self, effect: impl Into<String>) -> Self {
        self.side_effects.insert(effect.into());
        self
    }
}

// ============================================================================
// Views
// ============================================================================

/// Urgency of the next dose
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Overdue,
    DueSoon,
    Scheduled,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Overdue => "overdue",
            Severity::DueSoon => "due soon",
            Severity::Scheduled => "scheduled",
        };
        f.write_str(s)
    }
}

/// The single most urgent actionable dose
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NextDose {
    pub instance: DoseInstance,
    /// `scheduled_time - now`, negative when past due
    pub countdown: Duration,
    pub severity: Severity,
}

/// Per-order adherence figures
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MedicationAdherence {
    pub order_id: String,
    /// `None` until at least one dose is resolved
    pub rate: Option<f64>,
    pub taken_count: u32,
    pub missed_count: u32,
    pub skipped_count: u32,
    /// Resolved doses (taken + missed + skipped)
    pub total_count: u32,
}

/// Derived adherence statistics, recomputed on demand
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AdherenceSnapshot {
    pub overall_rate: Option<f64>,
    pub period_rate: Option<f64>,
    pub month_rate: Option<f64>,
    pub streak_days: u32,
    pub per_medication: Vec<MedicationAdherence>,
}

// ============================================================================
// Scheduling Settings
// ============================================================================

/// Knobs shared by every clock-dependent computation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// Delay after `scheduled_time` before a pending dose reads as overdue
    pub grace: Duration,
    /// Countdown at or under which the next dose is "due soon"
    pub due_soon: Duration,
    /// How many days ahead of `now` to materialize
    pub horizon_days: u32,
    /// The patient's local clock
    pub local_offset: FixedOffset,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            grace: Duration::minutes(30),
            due_soon: Duration::minutes(60),
            horizon_days: 7,
            local_offset: Utc.fix(),
        }
    }
}

impl ScheduleSettings {
    /// Local calendar date of an instant
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.local_offset).date_naive()
    }

    /// Absolute instant of a local date and time of day
    pub fn local_instant(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let utc_naive =
            date.and_time(time) - Duration::seconds(i64::from(self.local_offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc_naive)
    }

    /// Absolute instant of local midnight starting `date`
    pub fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        self.local_instant(date, NaiveTime::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_grace_window_boundary() {
        let now = ts("2024-01-15T10:00:00Z");
        let grace = Duration::minutes(30);

        let recent = DoseInstance::pending("o1", now - Duration::minutes(29));
        assert_eq!(recent.status_at(now, grace), DoseStatus::Pending);

        let exact = DoseInstance::pending("o1", now - Duration::minutes(30));
        assert_eq!(exact.status_at(now, grace), DoseStatus::Pending);

        let late = DoseInstance::pending("o1", now - Duration::minutes(31));
        assert_eq!(late.status_at(now, grace), DoseStatus::Overdue);

        let mut taken = late.clone();
        taken.status = DoseStatus::Taken;
        assert_eq!(taken.status_at(now, grace), DoseStatus::Taken);
    }

    #[test]
    fn test_instance_id_is_stable() {
        let at = ts("2024-01-15T09:00:00Z");
        assert_eq!(instance_id("rx1_0", at), instance_id("rx1_0", at));
        assert_ne!(instance_id("rx1_0", at), instance_id("rx1_1", at));
        assert_ne!(
            instance_id("rx1_0", at),
            instance_id("rx1_0", at + Duration::hours(12))
        );
    }

    #[test]
    fn test_parse_status() {
        assert_eq!("Taken".parse::<DoseStatus>().unwrap(), DoseStatus::Taken);
        assert_eq!(" missed ".parse::<DoseStatus>().unwrap(), DoseStatus::Missed);
        assert!(matches!(
            "eaten".parse::<DoseStatus>(),
            Err(crate::Error::InvalidStatus(s)) if s == "eaten"
        ));
    }

    #[test]
    fn test_order_end_date() {
        let order = MedicationOrder {
            id: "o1".into(),
            prescription_id: "rx1".into(),
            name: "Amoxicillin".into(),
            dosage_text: "500mg".into(),
            frequency_text: "Twice daily".into(),
            start_date: ts("2024-01-15T00:00:00Z"),
            duration_days: Some(2),
            instructions: None,
        };
        assert_eq!(order.end_date(), Some(ts("2024-01-17T00:00:00Z")));
        assert!(!order.window_elapsed(ts("2024-01-16T23:59:00Z")));
        assert!(order.window_elapsed(ts("2024-01-17T00:00:00Z")));
    }

    #[test]
    fn test_local_instant_with_offset() {
        let settings = ScheduleSettings {
            local_offset: FixedOffset::east_opt(5 * 3600 + 1800).unwrap(),
            ..ScheduleSettings::default()
        };
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

        let instant = settings.local_instant(date, nine);
        assert_eq!(instant, ts("2024-01-15T03:30:00Z"));
        assert_eq!(settings.local_date(ts("2024-01-14T20:00:00Z")), date);
    }
}
