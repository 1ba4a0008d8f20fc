//! Adherence statistics derived from the ledger.
//!
//! Rates are `taken / (taken + missed + skipped)`. Pending and overdue doses
//! are not counted either way, and a rate with no resolved doses is `None`.

use crate::{AdherenceSnapshot, DoseLedger, DoseStatus, MedicationAdherence};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;

/// Window used for the month rate
pub const MONTH_DAYS: u32 = 30;

/// Running count of resolved doses
#[derive(Clone, Copy, Debug, Default)]
struct Tally {
    taken: u32,
    missed: u32,
    skipped: u32,
}

impl Tally {
    fn add(&mut self, status: DoseStatus) {
        match status {
            DoseStatus::Taken => self.taken += 1,
            DoseStatus::Missed => self.missed += 1,
            DoseStatus::Skipped => self.skipped += 1,
            DoseStatus::Pending | DoseStatus::Overdue => {}
        }
    }

    fn resolved(&self) -> u32 {
        self.taken + self.missed + self.skipped
    }

    fn rate(&self) -> Option<f64> {
        match self.resolved() {
            0 => None,
            total => Some(f64::from(self.taken) / f64::from(total)),
        }
    }
}

/// Compute overall, period and month rates, the day streak and per-order figures
pub fn compute_adherence(
    ledger: &DoseLedger,
    now: DateTime<Utc>,
    period_days: u32,
) -> AdherenceSnapshot {
    let period_start = now - Duration::days(i64::from(period_days));
    let month_start = now - Duration::days(i64::from(MONTH_DAYS));

    let mut overall = Tally::default();
    let mut period = Tally::default();
    let mut month = Tally::default();
    let mut per_order: BTreeMap<&str, Tally> = ledger
        .orders()
        .map(|t| (t.order.id.as_str(), Tally::default()))
        .collect();

    for instance in ledger.instances() {
        overall.add(instance.status);
        if instance.scheduled_time >= period_start {
            period.add(instance.status);
        }
        if instance.scheduled_time >= month_start {
            month.add(instance.status);
        }
        per_order
            .entry(instance.order_id.as_str())
            .or_default()
            .add(instance.status);
    }

    let per_medication = per_order
        .into_iter()
        .map(|(order_id, tally)| MedicationAdherence {
            order_id: order_id.to_string(),
            rate: tally.rate(),
            taken_count: tally.taken,
            missed_count: tally.missed,
            skipped_count: tally.skipped,
            total_count: tally.resolved(),
        })
        .collect();

    let snapshot = AdherenceSnapshot {
        overall_rate: overall.rate(),
        period_rate: period.rate(),
        month_rate: month.rate(),
        streak_days: streak_days(ledger, now),
        per_medication,
    };

    tracing::debug!(
        "Adherence for {}: overall {:?}, {}-day {:?}, streak {}",
        ledger.patient_id(),
        snapshot.overall_rate,
        period_days,
        snapshot.period_rate,
        snapshot.streak_days
    );
    snapshot
}

/// Consecutive fully-taken local days, walking back from today
///
/// Today only counts once nothing scheduled today is still pending; while
/// it is unresolved the walk starts from yesterday. Days without doses count
/// as kept. The walk stops at the first day with a dose that was not taken,
/// or at the first day the ledger has any dose for.
fn streak_days(ledger: &DoseLedger, now: DateTime<Utc>) -> u32 {
    let settings = ledger.settings();
    let today = settings.local_date(now);

    let mut days: BTreeMap<NaiveDate, Vec<DoseStatus>> = BTreeMap::new();
    for instance in ledger.instances() {
        let day = settings.local_date(instance.scheduled_time);
        if day <= today {
            days.entry(day).or_default().push(instance.status);
        }
    }

    let Some(first_day) = days.keys().next().copied() else {
        return 0;
    };

    let kept = |day: &NaiveDate| {
        days.get(day)
            .map_or(true, |statuses| statuses.iter().all(|s| *s == DoseStatus::Taken))
    };

    let mut streak = 0;
    let today_unresolved = days
        .get(&today)
        .map_or(false, |statuses| statuses.iter().any(|s| s.is_actionable()));
    if !today_unresolved {
        if !kept(&today) {
            return 0;
        }
        streak += 1;
    }

    let mut day = today - Duration::days(1);
    while day >= first_day && kept(&day) {
        streak += 1;
        day = day - Duration::days(1);
    }
    streak
}
