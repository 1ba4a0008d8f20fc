//! Next-dose resolution over the ledger.
//!
//! Picks the most urgent actionable dose: earliest scheduled time first,
//! ties broken by ascending order id so repeated calls agree.

use crate::{DoseInstance, DoseLedger, DoseStatus, NextDose, Severity};
use chrono::{DateTime, Duration, Utc};

/// The single most urgent pending or overdue dose of an active order
pub fn resolve_next_dose(ledger: &DoseLedger, now: DateTime<Utc>) -> Option<NextDose> {
    actionable(ledger, now)
        .into_iter()
        .next()
        .map(|instance| describe(ledger, instance, now))
}

/// The next `limit` actionable doses in the same order as [`resolve_next_dose`]
pub fn upcoming(ledger: &DoseLedger, now: DateTime<Utc>, limit: usize) -> Vec<NextDose> {
    actionable(ledger, now)
        .into_iter()
        .take(limit)
        .map(|instance| describe(ledger, instance, now))
        .collect()
}

fn actionable(ledger: &DoseLedger, now: DateTime<Utc>) -> Vec<DoseInstance> {
    let mut candidates: Vec<DoseInstance> = ledger
        .instances()
        .filter(|i| i.status.is_actionable() && ledger.is_order_active(&i.order_id, now))
        .map(|i| i.view_at(now, ledger.settings().grace))
        .collect();

    candidates.sort_by(|a, b| {
        a.scheduled_time
            .cmp(&b.scheduled_time)
            .then_with(|| a.order_id.cmp(&b.order_id))
    });
    candidates
}

fn describe(ledger: &DoseLedger, instance: DoseInstance, now: DateTime<Utc>) -> NextDose {
    let countdown = instance.scheduled_time - now;
    let severity = if instance.status == DoseStatus::Overdue {
        Severity::Overdue
    } else if countdown <= ledger.settings().due_soon {
        Severity::DueSoon
    } else {
        Severity::Scheduled
    };

    NextDose {
        instance,
        countdown,
        severity,
    }
}

/// Human countdown, e.g. "2h 05m" or "overdue 0h 45m"
pub fn format_countdown(countdown: Duration) -> String {
    let minutes = countdown.num_minutes();
    let (prefix, minutes) = if countdown < Duration::zero() {
        ("overdue ", minutes.abs())
    } else {
        ("", minutes)
    };
    format!("{}{}h {:02}m", prefix, minutes / 60, minutes % 60)
}
