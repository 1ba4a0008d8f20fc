//! Free-text frequency and duration resolution.
//!
//! Prescriptions carry human phrases ("Twice daily", "Every 8 hours",
//! "3-5 days"). This module is the only place those phrases are interpreted;
//! everything downstream works with [`FrequencySpec`] and day counts.

use crate::FrequencySpec;
use chrono::NaiveTime;

/// Interval used when a frequency cannot be classified
pub const FALLBACK_INTERVAL_HOURS: u32 = 4;

/// Resolve frequency text into a recurrence rule
///
/// Case-insensitive substring rules, first match wins:
///
/// 1. "every 6 hours" → every 6 hours
/// 2. "every 8 hours" → every 8 hours
/// 3. "twice daily" / "twice a day" → 09:00 and 21:00
/// 4. "once daily" / "once a day" → 09:00
/// 5. "three times daily" / "thrice daily" → 09:00, 15:00 and 21:00
/// 6. "every N hours" with N dividing 24 → every N hours
///
/// Anything else falls back to a 4-hour interval. Never fails.
pub fn resolve_frequency(frequency_text: &str) -> FrequencySpec {
    let text = frequency_text.to_lowercase();

    if text.contains("every 6 hours") {
        return FrequencySpec::IntervalHours { n: 6 };
    }
    if text.contains("every 8 hours") {
        return FrequencySpec::IntervalHours { n: 8 };
    }
    if text.contains("twice daily") || text.contains("twice a day") {
        return FrequencySpec::FixedTimesPerDay {
            times: vec![hour(9), hour(21)],
        };
    }
    if text.contains("once daily") || text.contains("once a day") {
        return FrequencySpec::FixedTimesPerDay {
            times: vec![hour(9)],
        };
    }
    if text.contains("three times daily")
        || text.contains("three times a day")
        || text.contains("thrice daily")
    {
        return FrequencySpec::FixedTimesPerDay {
            times: vec![hour(9), hour(15), hour(21)],
        };
    }
    if let Some(n) = every_n_hours(&text) {
        return FrequencySpec::IntervalHours { n };
    }

    tracing::debug!(
        "Unparsable frequency {:?}, falling back to every {} hours",
        frequency_text,
        FALLBACK_INTERVAL_HOURS
    );
    FrequencySpec::Unrecognized {
        fallback_interval_hours: FALLBACK_INTERVAL_HOURS,
    }
}

/// Find "every <n> hour(s)" where n splits the day evenly
fn every_n_hours(text: &str) -> Option<u32> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words.windows(3).find_map(|w| {
        if w[0] != "every" || !w[2].starts_with("hour") {
            return None;
        }
        let n: u32 = w[1].parse().ok()?;
        (n > 0 && 24 % n == 0).then_some(n)
    })
}

fn hour(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Parse a free-text course duration into days
///
/// Ranges take the upper bound ("3-5 days" → 5); weeks are 7 days and
/// months 30. Open-ended or unreadable durations return `None`, meaning the
/// order runs indefinitely.
pub fn parse_duration_days(duration_text: &str) -> Option<u32> {
    let text = duration_text.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }

    if ["ongoing", "continuous", "indefinite", "long term", "as needed"]
        .iter()
        .any(|open| text.contains(open))
    {
        return None;
    }

    let mut words = text.split_whitespace();
    let amount = words.next()?;
    let unit = words.next().unwrap_or("days");

    let upper = amount.rsplit('-').next()?.trim();
    let count: u32 = match upper.parse() {
        Ok(count) => count,
        Err(_) => {
            tracing::debug!("Unreadable duration {:?}, treating as indefinite", duration_text);
            return None;
        }
    };

    let multiplier = if unit.starts_with("week") {
        7
    } else if unit.starts_with("month") {
        30
    } else if unit.starts_with("day") {
        1
    } else {
        tracing::debug!("Unknown duration unit {:?}, treating as indefinite", unit);
        return None;
    };

    count.checked_mul(multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(hours: &[u32]) -> FrequencySpec {
        FrequencySpec::FixedTimesPerDay {
            times: hours.iter().map(|h| hour(*h)).collect(),
        }
    }

    #[test]
    fn test_canonical_phrases() {
        assert_eq!(
            resolve_frequency("every 6 hours"),
            FrequencySpec::IntervalHours { n: 6 }
        );
        assert_eq!(
            resolve_frequency("every 8 hours"),
            FrequencySpec::IntervalHours { n: 8 }
        );
        assert_eq!(resolve_frequency("twice daily"), fixed(&[9, 21]));
        assert_eq!(resolve_frequency("twice a day"), fixed(&[9, 21]));
        assert_eq!(resolve_frequency("once daily"), fixed(&[9]));
        assert_eq!(resolve_frequency("once a day"), fixed(&[9]));
        assert_eq!(
            resolve_frequency("as directed"),
            FrequencySpec::Unrecognized {
                fallback_interval_hours: 4
            }
        );
    }

    #[test]
    fn test_surrounding_text_and_case() {
        assert_eq!(resolve_frequency("Take twice daily with food"), fixed(&[9, 21]));
        assert_eq!(
            resolve_frequency("Paracetamol: Every 8 Hours after meals"),
            FrequencySpec::IntervalHours { n: 8 }
        );
        assert_eq!(resolve_frequency("ONCE A DAY at bedtime"), fixed(&[9]));
    }

    #[test]
    fn test_rule_order() {
        // Interval phrases are checked before daily phrases
        assert_eq!(
            resolve_frequency("every 6 hours, at most twice daily"),
            FrequencySpec::IntervalHours { n: 6 }
        );
        assert_eq!(resolve_frequency("twice daily, once daily if mild"), fixed(&[9, 21]));
    }

    #[test]
    fn test_extended_phrases() {
        assert_eq!(resolve_frequency("Three times daily"), fixed(&[9, 15, 21]));
        assert_eq!(
            resolve_frequency("every 12 hours"),
            FrequencySpec::IntervalHours { n: 12 }
        );
        assert_eq!(
            resolve_frequency("every 1 hour while awake"),
            FrequencySpec::IntervalHours { n: 1 }
        );
    }

    #[test]
    fn test_unclassified_phrases_fall_back() {
        for text in ["Every 6-8 hours", "every 5 hours", "", "SOS", "weekly"] {
            assert_eq!(
                resolve_frequency(text),
                FrequencySpec::Unrecognized {
                    fallback_interval_hours: FALLBACK_INTERVAL_HOURS
                },
                "text {:?}",
                text
            );
        }
    }

    #[test]
    fn test_parse_duration_days() {
        assert_eq!(parse_duration_days("5 days"), Some(5));
        assert_eq!(parse_duration_days("3-5 days"), Some(5));
        assert_eq!(parse_duration_days("1 week"), Some(7));
        assert_eq!(parse_duration_days("2 Weeks"), Some(14));
        assert_eq!(parse_duration_days("1 month"), Some(30));
        assert_eq!(parse_duration_days("10"), Some(10));
    }

    #[test]
    fn test_parse_open_durations() {
        assert_eq!(parse_duration_days(""), None);
        assert_eq!(parse_duration_days("Ongoing"), None);
        assert_eq!(parse_duration_days("until symptoms resolve"), None);
        assert_eq!(parse_duration_days("5 fortnights"), None);
    }
}
