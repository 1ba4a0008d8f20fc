//! Per-patient facade over the dose ledger.
//!
//! Each patient's ledger sits behind its own `RwLock`: `sync_prescriptions`
//! and `log_dose` take the write lock, so the terminal check and the update
//! happen as one step and two racing loggers cannot both succeed. Views
//! (`get_today_schedule`, `get_next_dose`, `get_adherence`) share the read
//! lock and always see whole instances.

use crate::{
    compute_adherence, resolve_next_dose, upcoming, AdherenceSnapshot, DoseFilter, DoseInstance,
    DoseLedger, DoseLog, Error, LedgerSnapshot, NextDose, Prescription, Result, ScheduleSettings,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

type SharedLedger = Arc<RwLock<DoseLedger>>;

/// Dose scheduling engine for many patients
#[derive(Debug, Default)]
pub struct DoseEngine {
    settings: ScheduleSettings,
    patients: RwLock<HashMap<String, SharedLedger>>,
    /// Instance id → owning patient
    owners: RwLock<HashMap<Uuid, String>>,
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::State("ledger lock poisoned".into())
}

impl DoseEngine {
    pub fn new(settings: ScheduleSettings) -> Self {
        Self {
            settings,
            patients: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ScheduleSettings {
        &self.settings
    }

    /// Install a previously saved ledger, replacing any in memory
    pub fn restore(&self, snapshot: LedgerSnapshot) -> Result<()> {
        let ledger = DoseLedger::from_snapshot(snapshot, self.settings);
        let patient_id = ledger.patient_id().to_string();

        {
            let mut owners = self.owners.write().map_err(poisoned)?;
            for instance in ledger.instances() {
                owners.insert(instance.id, patient_id.clone());
            }
        }

        self.patients
            .write()
            .map_err(poisoned)?
            .insert(patient_id, Arc::new(RwLock::new(ledger)));
        Ok(())
    }

    /// Serializable copy of a patient's ledger
    pub fn snapshot(&self, patient_id: &str) -> Result<Option<LedgerSnapshot>> {
        self.read(patient_id, |ledger| ledger.snapshot())
    }

    /// Bring a patient's ledger in line with their prescriptions
    ///
    /// Each order's active flag follows its prescription at `now`, so a
    /// renewed prescription resumes scheduling. Active orders are
    /// materialized up to the configured horizon. Returns the number of new
    /// dose instances.
    pub fn sync_prescriptions(
        &self,
        patient_id: &str,
        prescriptions: &[Prescription],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let shared = self.ledger_or_create(patient_id)?;
        let mut ledger = shared.write().map_err(poisoned)?;

        let mut added = Vec::new();
        for prescription in prescriptions {
            if prescription.patient_id != patient_id {
                tracing::warn!(
                    "Skipping prescription {} for patient {} while syncing {}",
                    prescription.id,
                    prescription.patient_id,
                    patient_id
                );
                continue;
            }

            let active = prescription.is_active_at(now);
            for order in &prescription.medications {
                ledger.track_order(order, active)?;
                if active {
                    added.extend(ledger.materialize(order, now, self.settings.horizon_days)?);
                }
            }
        }

        if !added.is_empty() {
            let mut owners = self.owners.write().map_err(poisoned)?;
            for instance in &added {
                owners.insert(instance.id, patient_id.to_string());
            }
        }

        tracing::info!(
            "Synced {} prescriptions for {}: {} new doses",
            prescriptions.len(),
            patient_id,
            added.len()
        );
        Ok(added.len())
    }

    /// All doses on a local calendar day, statuses derived at `now`
    pub fn get_today_schedule(
        &self,
        patient_id: &str,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<DoseInstance>> {
        let filter = DoseFilter::local_day(date, &self.settings);
        Ok(self
            .read(patient_id, |ledger| ledger.query(&filter, now))?
            .unwrap_or_default())
    }

    /// Doses matching an arbitrary filter
    pub fn query(
        &self,
        patient_id: &str,
        filter: &DoseFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<DoseInstance>> {
        Ok(self
            .read(patient_id, |ledger| ledger.query(filter, now))?
            .unwrap_or_default())
    }

    /// The most urgent actionable dose, if any
    pub fn get_next_dose(&self, patient_id: &str, now: DateTime<Utc>) -> Result<Option<NextDose>> {
        Ok(self
            .read(patient_id, |ledger| resolve_next_dose(ledger, now))?
            .flatten())
    }

    /// The next `limit` actionable doses
    pub fn get_upcoming(
        &self,
        patient_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NextDose>> {
        Ok(self
            .read(patient_id, |ledger| upcoming(ledger, now, limit))?
            .unwrap_or_default())
    }

    /// Adherence statistics; an unknown patient has no rates yet
    pub fn get_adherence(
        &self,
        patient_id: &str,
        period_days: u32,
        now: DateTime<Utc>,
    ) -> Result<AdherenceSnapshot> {
        Ok(self
            .read(patient_id, |ledger| compute_adherence(ledger, now, period_days))?
            .unwrap_or_default())
    }

    /// Record a terminal outcome for a dose of any patient
    pub fn log_dose(
        &self,
        instance_id: Uuid,
        log: DoseLog,
        now: DateTime<Utc>,
    ) -> Result<DoseInstance> {
        let patient_id = self
            .owners
            .read()
            .map_err(poisoned)?
            .get(&instance_id)
            .cloned()
            .ok_or(Error::UnknownInstance(instance_id))?;

        let shared = self
            .ledger(&patient_id)?
            .ok_or(Error::UnknownInstance(instance_id))?;
        let mut ledger = shared.write().map_err(poisoned)?;
        ledger.log_dose(instance_id, log, now)
    }

    /// Run a read-only view over a patient's ledger
    pub fn read<T>(&self, patient_id: &str, f: impl FnOnce(&DoseLedger) -> T) -> Result<Option<T>> {
        let Some(shared) = self.ledger(patient_id)? else {
            return Ok(None);
        };
        let ledger = shared.read().map_err(poisoned)?;
        Ok(Some(f(&ledger)))
    }

    fn ledger(&self, patient_id: &str) -> Result<Option<SharedLedger>> {
        Ok(self
            .patients
            .read()
            .map_err(poisoned)?
            .get(patient_id)
            .cloned())
    }

    fn ledger_or_create(&self, patient_id: &str) -> Result<SharedLedger> {
        let mut patients = self.patients.write().map_err(poisoned)?;
        let shared = patients.entry(patient_id.to_string()).or_insert_with(|| {
            tracing::debug!("Creating ledger for {}", patient_id);
            Arc::new(RwLock::new(DoseLedger::new(patient_id, self.settings)))
        });
        Ok(Arc::clone(shared))
    }
}
