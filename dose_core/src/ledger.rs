//! The dose ledger: every dose instance of one patient and its lifecycle.
//!
//! The ledger is the only writer of [`DoseInstance`] state. Instances are
//! created by [`DoseLedger::materialize`] and changed only by
//! [`DoseLedger::log_dose`]; nothing is ever deleted. `Overdue` is never
//! stored: reads derive it from the stored pending status and `now`.

use crate::{
    generate_schedule, resolve_frequency, DoseInstance, DoseLog, DoseStatus, Error,
    FrequencySpec, MedicationOrder, Result, ScheduleSettings,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// An order known to the ledger with its resolved recurrence rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrackedOrder {
    pub order: MedicationOrder,
    pub spec: FrequencySpec,
    /// Follows the owning prescription on every sync; history is kept
    pub active: bool,
}

/// Serializable form of a ledger, used by the snapshot store
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub patient_id: String,
    #[serde(default)]
    pub orders: Vec<TrackedOrder>,
    #[serde(default)]
    pub instances: Vec<DoseInstance>,
}

/// Selection criteria for [`DoseLedger::query`]
///
/// `from` is inclusive and `until` exclusive. `status` is compared against
/// the status derived at query time, so `Overdue` is a valid filter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DoseFilter {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub order_id: Option<String>,
    pub status: Option<DoseStatus>,
}

impl DoseFilter {
    pub fn between(from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            until: Some(until),
            ..Self::default()
        }
    }

    /// All doses on one local calendar day
    pub fn local_day(date: NaiveDate, settings: &ScheduleSettings) -> Self {
        Self::between(
            settings.local_midnight(date),
            settings.local_midnight(date + Duration::days(1)),
        )
    }

    pub fn for_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_status(mut self, status: DoseStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// `view` carries the status derived at query time
    pub fn matches(&self, view: &DoseInstance) -> bool {
        self.from.map_or(true, |from| view.scheduled_time >= from)
            && self.until.map_or(true, |until| view.scheduled_time < until)
            && self
                .order_id
                .as_ref()
                .map_or(true, |id| &view.order_id == id)
            && self.status.map_or(true, |status| status == view.status)
    }
}

/// All dose instances of one patient
#[derive(Clone, Debug)]
pub struct DoseLedger {
    patient_id: String,
    settings: ScheduleSettings,
    orders: BTreeMap<String, TrackedOrder>,
    instances: HashMap<Uuid, DoseInstance>,
    /// `(order_id, scheduled_time)` → instance id, one entry per slot
    slots: BTreeMap<(String, DateTime<Utc>), Uuid>,
}

impl DoseLedger {
    /// Create an empty ledger for a patient
    pub fn new(patient_id: impl Into<String>, settings: ScheduleSettings) -> Self {
        Self {
            patient_id: patient_id.into(),
            settings,
            orders: BTreeMap::new(),
            instances: HashMap::new(),
            slots: BTreeMap::new(),
        }
    }

    /// Rebuild a ledger from a snapshot
    ///
    /// Duplicate slots keep the first instance seen, preferring one that
    /// already carries a terminal log.
    pub fn from_snapshot(snapshot: LedgerSnapshot, settings: ScheduleSettings) -> Self {
        let mut ledger = Self::new(snapshot.patient_id, settings);

        for tracked in snapshot.orders {
            ledger.orders.insert(tracked.order.id.clone(), tracked);
        }

        let mut instances = snapshot.instances;
        instances.sort_by_key(|i| !i.status.is_terminal());
        for instance in instances {
            let key = (instance.order_id.clone(), instance.scheduled_time);
            if ledger.slots.contains_key(&key) {
                tracing::warn!(
                    "Dropping duplicate dose {} for order {} at {}",
                    instance.id,
                    instance.order_id,
                    instance.scheduled_time
                );
                continue;
            }
            ledger.slots.insert(key, instance.id);
            ledger.instances.insert(instance.id, instance);
        }

        tracing::debug!(
            "Restored ledger for {} with {} orders and {} doses",
            ledger.patient_id,
            ledger.orders.len(),
            ledger.instances.len()
        );
        ledger
    }

    /// Serializable copy of the ledger, instances in schedule order
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            patient_id: self.patient_id.clone(),
            orders: self.orders.values().cloned().collect(),
            instances: schedule_order(self.instances.values().cloned().collect()),
        }
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn settings(&self) -> &ScheduleSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Ensure instances exist for `order` up to `now + horizon_days`
    ///
    /// Returns only the instances added by this call; slots that already
    /// exist are left untouched. An inactive or elapsed order adds nothing.
    pub fn materialize(
        &mut self,
        order: &MedicationOrder,
        now: DateTime<Utc>,
        horizon_days: u32,
    ) -> Result<Vec<DoseInstance>> {
        let tracked = self.track(order)?;
        if !tracked.active {
            tracing::debug!("Order {} is inactive, not materializing", order.id);
            return Ok(Vec::new());
        }
        let spec = tracked.spec.clone();

        let horizon_end = now + Duration::days(i64::from(horizon_days));
        let slots = generate_schedule(order, &spec, horizon_end, now, &self.settings);

        let mut added = Vec::new();
        for scheduled_time in slots {
            let key = (order.id.clone(), scheduled_time);
            if self.slots.contains_key(&key) {
                continue;
            }
            let instance = DoseInstance::pending(&order.id, scheduled_time);
            self.slots.insert(key, instance.id);
            self.instances.insert(instance.id, instance.clone());
            added.push(instance);
        }

        if !added.is_empty() {
            tracing::info!(
                "Materialized {} new doses for order {} ({})",
                added.len(),
                order.id,
                order.name
            );
        }
        Ok(added)
    }

    /// Register or refresh an order
    ///
    /// A changed start date or frequency text, or a course that now ends
    /// earlier, is an [`Error::OrderConflict`]: doses already generated would
    /// no longer match the order. A longer course is accepted.
    fn track(&mut self, order: &MedicationOrder) -> Result<&TrackedOrder> {
        if let Some(existing) = self.orders.get_mut(&order.id) {
            if existing.order.start_date != order.start_date
                || existing.order.frequency_text != order.frequency_text
                || ends_earlier(order, &existing.order)
            {
                return Err(Error::OrderConflict(order.id.clone()));
            }
            existing.order = order.clone();
        } else {
            let spec = resolve_frequency(&order.frequency_text);
            tracing::debug!("Tracking order {} as {:?}", order.id, spec);
            self.orders.insert(
                order.id.clone(),
                TrackedOrder {
                    order: order.clone(),
                    spec,
                    active: true,
                },
            );
        }
        self.orders
            .get(&order.id)
            .ok_or_else(|| Error::UnknownOrder(order.id.clone()))
    }

    /// Register or refresh an order and set whether it may be materialized
    pub fn track_order(&mut self, order: &MedicationOrder, active: bool) -> Result<()> {
        self.track(order)?;
        self.set_active(&order.id, active)
    }

    /// Start or stop materializing an order; existing instances keep their state
    pub fn set_active(&mut self, order_id: &str, active: bool) -> Result<()> {
        let tracked = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| Error::UnknownOrder(order_id.to_string()))?;
        if tracked.active != active {
            tracked.active = active;
            if active {
                tracing::info!("Reactivated order {}", order_id);
            } else {
                tracing::info!("Deactivated order {}", order_id);
            }
        }
        Ok(())
    }

    /// Whether doses of this order may still be offered at `now`
    ///
    /// False once the owning prescription stops or the course has ended.
    pub fn is_order_active(&self, order_id: &str, now: DateTime<Utc>) -> bool {
        self.orders
            .get(order_id)
            .map_or(false, |t| t.active && !t.order.window_elapsed(now))
    }

    pub fn order(&self, order_id: &str) -> Option<&MedicationOrder> {
        self.orders.get(order_id).map(|t| &t.order)
    }

    pub fn orders(&self) -> impl Iterator<Item = &TrackedOrder> {
        self.orders.values()
    }

    /// Record a terminal outcome for one dose
    ///
    /// Fails with [`Error::AlreadyLogged`] if the dose is already terminal
    /// and with [`Error::InvalidStatus`] if `log.status` is not taken,
    /// missed or skipped. A taken dose without an explicit time is stamped
    /// with `now`.
    pub fn log_dose(
        &mut self,
        instance_id: Uuid,
        log: DoseLog,
        now: DateTime<Utc>,
    ) -> Result<DoseInstance> {
        let instance = self
            .instances
            .get_mut(&instance_id)
            .ok_or(Error::UnknownInstance(instance_id))?;

        if instance.status.is_terminal() {
            return Err(Error::AlreadyLogged {
                instance_id,
                existing: Box::new(instance.clone()),
            });
        }
        if !log.status.is_terminal() {
            return Err(Error::InvalidStatus(log.status.to_string()));
        }

        instance.status = log.status;
        instance.actual_time = match log.status {
            DoseStatus::Taken => Some(log.actual_time.unwrap_or(now)),
            _ => None,
        };
        instance.notes = log.notes;
        instance.side_effects = log.side_effects;
        instance.logged_at = Some(now);

        tracing::info!(
            "Logged dose {} of order {} as {}",
            instance_id,
            instance.order_id,
            instance.status
        );
        Ok(instance.clone())
    }

    /// One instance with its status derived at `now`
    pub fn get(&self, instance_id: Uuid, now: DateTime<Utc>) -> Option<DoseInstance> {
        self.instances
            .get(&instance_id)
            .map(|i| i.view_at(now, self.settings.grace))
    }

    /// Status of an instance at `now`
    pub fn status_of(&self, instance: &DoseInstance, now: DateTime<Utc>) -> DoseStatus {
        instance.status_at(now, self.settings.grace)
    }

    /// Instances matching `filter`, statuses derived at `now`, in schedule order
    pub fn query(&self, filter: &DoseFilter, now: DateTime<Utc>) -> Vec<DoseInstance> {
        let matching = self
            .instances
            .values()
            .map(|i| i.view_at(now, self.settings.grace))
            .filter(|view| filter.matches(view))
            .collect();
        schedule_order(matching)
    }

    /// Stored instances, in no particular order
    pub fn instances(&self) -> impl Iterator<Item = &DoseInstance> {
        self.instances.values()
    }
}

/// Whether `order` ends before `previous` did; no end date is the latest
fn ends_earlier(order: &MedicationOrder, previous: &MedicationOrder) -> bool {
    match (order.end_date(), previous.end_date()) {
        (Some(end), Some(previous_end)) => end < previous_end,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Earliest first, ties by order id
fn schedule_order(mut instances: Vec<DoseInstance>) -> Vec<DoseInstance> {
    instances.sort_by(|a, b| {
        a.scheduled_time
            .cmp(&b.scheduled_time)
            .then_with(|| a.order_id.cmp(&b.order_id))
    });
    instances
}
