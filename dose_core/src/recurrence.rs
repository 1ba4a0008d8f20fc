//! Recurrence expansion: recurrence rule + order window → dose timestamps.
//!
//! Generation rules:
//! - Fixed times: every listed local time of each calendar day, starting
//!   with today's slots. Once `now` is past today's last slot the schedule
//!   starts on the next day, so a late second slot is not backfilled.
//! - Intervals: local-midnight-aligned boundaries (00:00, n:00, 2n:00, ...)
//!   starting from the most recent boundary at or before `now`.
//!
//! All slots fall inside `[order.start_date, order.end_date())` and at or
//! before `horizon_end`. Boundaries only depend on the order and the local
//! calendar, so repeated calls never shift a timestamp.

use crate::{FrequencySpec, MedicationOrder, ScheduleSettings};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};

/// Expand a recurrence rule into ordered dose timestamps
pub fn generate_schedule(
    order: &MedicationOrder,
    spec: &FrequencySpec,
    horizon_end: DateTime<Utc>,
    now: DateTime<Utc>,
    settings: &ScheduleSettings,
) -> Vec<DateTime<Utc>> {
    let window = Window {
        start: order.start_date,
        end: order.end_date(),
        horizon_end,
    };

    if window.is_empty() {
        tracing::debug!("Order {} has an empty active window", order.id);
        return Vec::new();
    }

    let anchor = now.max(order.start_date);

    let slots = match spec {
        FrequencySpec::FixedTimesPerDay { times } => fixed_times(times, anchor, &window, settings),
        FrequencySpec::IntervalHours { n } => interval_hours(*n, anchor, &window, settings),
        FrequencySpec::Unrecognized {
            fallback_interval_hours,
        } => interval_hours(*fallback_interval_hours, anchor, &window, settings),
    };

    tracing::debug!(
        "Generated {} slots for order {} up to {}",
        slots.len(),
        order.id,
        horizon_end
    );
    slots
}

/// Bounds every generated slot must satisfy
struct Window {
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    horizon_end: DateTime<Utc>,
}

impl Window {
    fn is_empty(&self) -> bool {
        self.end.map_or(false, |end| end <= self.start) || self.horizon_end < self.start
    }

    /// True once `t` is beyond the horizon or the order's end
    fn exhausted_at(&self, t: DateTime<Utc>) -> bool {
        t > self.horizon_end || self.end.map_or(false, |end| t >= end)
    }
}

fn fixed_times(
    times: &[NaiveTime],
    anchor: DateTime<Utc>,
    window: &Window,
    settings: &ScheduleSettings,
) -> Vec<DateTime<Utc>> {
    let mut times = times.to_vec();
    times.sort();
    times.dedup();

    let Some(last_time) = times.last().copied() else {
        return Vec::new();
    };

    let mut day = settings.local_date(anchor);
    if anchor > settings.local_instant(day, last_time) {
        day = next_day(day);
    }

    let mut slots = Vec::new();
    while !window.exhausted_at(settings.local_midnight(day)) {
        for time in &times {
            let slot = settings.local_instant(day, *time);
            if slot >= window.start && !window.exhausted_at(slot) {
                slots.push(slot);
            }
        }
        day = next_day(day);
    }
    slots
}

fn interval_hours(
    n: u32,
    anchor: DateTime<Utc>,
    window: &Window,
    settings: &ScheduleSettings,
) -> Vec<DateTime<Utc>> {
    if n == 0 {
        tracing::warn!("Ignoring zero-hour dosing interval");
        return Vec::new();
    }

    let local_anchor = anchor.with_timezone(&settings.local_offset);
    let mut day = local_anchor.date_naive();
    let floor_hour = (local_anchor.hour() / n) * n;
    let first = settings.local_instant(day, at_hour(floor_hour));

    let mut slots = Vec::new();
    while !window.exhausted_at(settings.local_midnight(day)) {
        for hour in (0..24).step_by(n as usize) {
            let slot = settings.local_instant(day, at_hour(hour));
            if slot >= first && slot >= window.start && !window.exhausted_at(slot) {
                slots.push(slot);
            }
        }
        day = next_day(day);
    }
    slots
}

fn next_day(day: NaiveDate) -> NaiveDate {
    day + Duration::days(1)
}

fn at_hour(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}
