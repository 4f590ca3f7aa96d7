use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::CoreError;

/// How a "HH:mm" slot-time string relates to the UTC instants we store.
///
/// The two interpretations coexist in the domain and mixing them corrupts
/// slot times, so every conversion call site names its policy explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotTimePolicy {
    /// The wall-clock pair already is UTC (admin demo slots pinned to the
    /// server's display convention).
    LiteralUtc,
    /// The wall-clock pair is local to the therapist's stored timezone and
    /// must be converted to true UTC.
    TherapistLocal(Tz),
}

pub fn resolve_timezone(tz: &str) -> Result<Tz, CoreError> {
    tz.parse::<Tz>()
        .map_err(|_| CoreError::Validation(format!("Unknown timezone: {tz}")))
}

/// Strict 24-hour "HH:mm" (hour 0-23 with optional leading zero, minute
/// always two digits).
pub fn parse_slot_time(s: &str) -> Result<NaiveTime, CoreError> {
    let invalid = || CoreError::Validation(format!("Invalid slot time '{s}', expected HH:mm"));

    let (h, m) = s.split_once(':').ok_or_else(invalid)?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return Err(invalid());
    }
    if !h.bytes().all(|b| b.is_ascii_digit()) || !m.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Strict "YYYY-MM-DD" with the year constrained to [2000, 2099].
/// Checked before any database mutation.
pub fn parse_schedule_date(s: &str) -> Result<NaiveDate, CoreError> {
    let invalid = || CoreError::Validation(format!("Invalid date '{s}', expected YYYY-MM-DD"));

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| invalid())?;
    // Re-format to reject shorthand like "2024-1-5" that chrono tolerates.
    if date.format("%Y-%m-%d").to_string() != s {
        return Err(invalid());
    }
    if !(2000..=2099).contains(&date.year()) {
        return Err(CoreError::Validation(format!(
            "Date '{s}' is outside the supported range (year 2000-2099)"
        )));
    }
    Ok(date)
}

/// Compute the UTC instant for a wall-clock (date, time) pair under the
/// given policy. A time that falls into a DST gap is rejected; an ambiguous
/// time (DST fold) resolves to the earlier instant.
pub fn slot_instant(
    date: NaiveDate,
    time: NaiveTime,
    policy: &SlotTimePolicy,
) -> Result<DateTime<Utc>, CoreError> {
    let naive = date.and_time(time);
    match policy {
        SlotTimePolicy::LiteralUtc => Ok(Utc.from_utc_datetime(&naive)),
        SlotTimePolicy::TherapistLocal(tz) => match tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earlier, _) => Ok(earlier.with_timezone(&Utc)),
            LocalResult::None => Err(CoreError::Validation(format!(
                "{naive} does not exist in timezone {tz} (DST gap)"
            ))),
        },
    }
}

/// Inverse of `slot_instant`: the "HH:mm" label of an instant in the
/// policy's wall-clock frame.
pub fn local_slot_label(instant: DateTime<Utc>, policy: &SlotTimePolicy) -> String {
    match policy {
        SlotTimePolicy::LiteralUtc => instant.format("%H:%M").to_string(),
        SlotTimePolicy::TherapistLocal(tz) => {
            instant.with_timezone(tz).format("%H:%M").to_string()
        }
    }
}

/// The UTC half-open window [00:00, +24h) covering one leave day. All
/// leave/slot day comparisons go through this.
pub fn leave_day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap());
    (start, start + Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;
    use chrono_tz::Asia::Kolkata;

    #[test]
    fn slot_time_accepts_valid_forms() {
        for (input, h, m) in [("09:00", 9, 0), ("9:05", 9, 5), ("23:59", 23, 59), ("0:00", 0, 0)] {
            let t = parse_slot_time(input).unwrap();
            assert_eq!(t, NaiveTime::from_hms_opt(h, m, 0).unwrap(), "{input}");
        }
    }

    #[test]
    fn slot_time_rejects_malformed_forms() {
        for input in ["24:00", "12:60", "12:5", "1200", "ab:cd", "12:005", ":30", "12:", "-1:00"] {
            assert!(
                matches!(parse_slot_time(input), Err(CoreError::Validation(_))),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn schedule_date_is_strict() {
        assert_eq!(
            parse_schedule_date("2025-06-02").unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
        );
        for input in ["2025-6-02", "2025-06-2", "02-06-2025", "2025/06/02", "1999-01-01", "2100-01-01", "2025-02-30"] {
            assert!(
                matches!(parse_schedule_date(input), Err(CoreError::Validation(_))),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn literal_utc_policy_keeps_wall_clock() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let instant = slot_instant(date, time, &SlotTimePolicy::LiteralUtc).unwrap();
        assert_eq!(instant.to_rfc3339(), "2025-03-10T09:00:00+00:00");
        assert_eq!(local_slot_label(instant, &SlotTimePolicy::LiteralUtc), "09:00");
    }

    #[test]
    fn therapist_local_policy_converts_to_utc() {
        // 09:00 in Kolkata (UTC+5:30) is 03:30 UTC, year-round.
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let policy = SlotTimePolicy::TherapistLocal(Kolkata);
        let instant = slot_instant(date, time, &policy).unwrap();
        assert_eq!(instant.to_rfc3339(), "2025-03-10T03:30:00+00:00");
        assert_eq!(local_slot_label(instant, &policy), "09:00");
    }

    #[test]
    fn dst_gap_is_rejected() {
        // 2025-03-09 02:30 never happens in New York (spring forward).
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let time = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let policy = SlotTimePolicy::TherapistLocal(New_York);
        assert!(matches!(
            slot_instant(date, time, &policy),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn dst_fold_resolves_to_earlier_instant() {
        // 2025-11-02 01:30 happens twice in New York; we take EDT (UTC-4).
        let date = NaiveDate::from_ymd_opt(2025, 11, 2).unwrap();
        let time = NaiveTime::from_hms_opt(1, 30, 0).unwrap();
        let policy = SlotTimePolicy::TherapistLocal(New_York);
        let instant = slot_instant(date, time, &policy).unwrap();
        assert_eq!(instant.to_rfc3339(), "2025-11-02T05:30:00+00:00");
    }

    #[test]
    fn leave_day_bounds_cover_the_utc_day() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 4).unwrap();
        let (start, end) = leave_day_bounds(date);
        assert_eq!(start.to_rfc3339(), "2025-07-04T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-07-05T00:00:00+00:00");
    }

    #[test]
    fn unknown_timezone_is_a_validation_error() {
        assert!(matches!(
            resolve_timezone("Mars/Olympus_Mons"),
            Err(CoreError::Validation(_))
        ));
        assert_eq!(resolve_timezone("UTC").unwrap(), chrono_tz::UTC);
    }
}
