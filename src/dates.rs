//! Calendar helpers. Attendance days are tenant-local: a mark's `date_ms` is the
//! epoch millisecond of local midnight for the tenant's UTC offset.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, TimeZone, Utc};

pub const MIN_UTC_OFFSET_MINUTES: i32 = -12 * 60;
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn offset_from_minutes(minutes: i32) -> CoreResult<FixedOffset> {
    if !(MIN_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&minutes) {
        return Err(CoreError::invalid(format!(
            "utcOffsetMinutes must be between {} and {}",
            MIN_UTC_OFFSET_MINUTES, MAX_UTC_OFFSET_MINUTES
        )));
    }
    FixedOffset::east_opt(minutes * 60)
        .ok_or_else(|| CoreError::invalid("utcOffsetMinutes out of range"))
}

fn midnight_ms(date: NaiveDate, offset: FixedOffset) -> CoreResult<i64> {
    let local = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CoreError::invalid("date is not representable"))?;
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(|| CoreError::invalid("date is not representable"))
}

/// Truncates an epoch-millisecond instant to the start of its tenant-local day.
pub fn local_midnight_ms(ms: i64, offset: FixedOffset) -> CoreResult<i64> {
    let instant = DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| CoreError::invalid("dateMs out of range"))?;
    midnight_ms(instant.with_timezone(&offset).date_naive(), offset)
}

fn parse_calendar_date(raw: &str, offset: FixedOffset) -> Option<NaiveDate> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Some(d);
    }
    DateTime::parse_from_rfc3339(t)
        .ok()
        .map(|dt| dt.with_timezone(&offset).date_naive())
}

/// Resolves the day a request refers to. An explicit `date_ms` wins over `date`;
/// both are normalized to tenant-local midnight.
pub fn resolve_date_ms(
    date_ms: Option<i64>,
    date: Option<&str>,
    offset: FixedOffset,
) -> CoreResult<i64> {
    if let Some(ms) = date_ms {
        return local_midnight_ms(ms, offset);
    }
    match date.and_then(|d| parse_calendar_date(d, offset)) {
        Some(day) => midnight_ms(day, offset),
        None => Err(CoreError::invalid("provide dateMs or date (YYYY-MM-DD)")),
    }
}

/// Inclusive `[first ms, last ms]` of a tenant-local calendar month.
pub fn month_range(month: i64, year: i64, offset: FixedOffset) -> CoreResult<(i64, i64)> {
    if !(1..=12).contains(&month) {
        return Err(CoreError::invalid("invalid month/year"));
    }
    let year = i32::try_from(year).map_err(|_| CoreError::invalid("invalid month/year"))?;
    let month = month as u32;
    let (next_year, next_month) = if month == 12 {
        (year.checked_add(1), 1)
    } else {
        (Some(year), month + 1)
    };
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = next_year.and_then(|y| NaiveDate::from_ymd_opt(y, next_month, 1));
    let (Some(first), Some(next)) = (first, next) else {
        return Err(CoreError::invalid("invalid month/year"));
    };
    let start = midnight_ms(first, offset)?;
    let end = midnight_ms(next, offset)? - 1;
    Ok((start, end))
}

/// ISO-8601 in UTC with millisecond precision, e.g. `2024-03-01T00:00:00.000Z`.
pub fn iso_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARCH_1_2024_UTC: i64 = 1_709_251_200_000;
    const IST: i32 = 330;

    fn utc() -> FixedOffset {
        offset_from_minutes(0).unwrap()
    }

    #[test]
    fn calendar_string_resolves_to_local_midnight() {
        assert_eq!(
            resolve_date_ms(None, Some("2024-03-01"), utc()).unwrap(),
            MARCH_1_2024_UTC
        );
        let ist = offset_from_minutes(IST).unwrap();
        assert_eq!(
            resolve_date_ms(None, Some("2024-03-01"), ist).unwrap(),
            MARCH_1_2024_UTC - 330 * 60_000
        );
    }

    #[test]
    fn explicit_ms_wins_and_is_truncated() {
        let noonish = MARCH_1_2024_UTC + 13 * 3_600_000 + 17;
        assert_eq!(
            resolve_date_ms(Some(noonish), Some("1999-01-01"), utc()).unwrap(),
            MARCH_1_2024_UTC
        );
        // Epoch zero is a real date, not an absent one.
        assert_eq!(resolve_date_ms(Some(0), None, utc()).unwrap(), 0);
    }

    #[test]
    fn rfc3339_input_uses_the_tenant_calendar_day() {
        let ist = offset_from_minutes(IST).unwrap();
        // 20:00Z on Feb 29 is already March 1 in IST.
        let got = resolve_date_ms(None, Some("2024-02-29T20:00:00Z"), ist).unwrap();
        assert_eq!(got, MARCH_1_2024_UTC - 330 * 60_000);
    }

    #[test]
    fn unresolvable_dates_are_invalid_input() {
        assert!(matches!(
            resolve_date_ms(None, None, utc()),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            resolve_date_ms(None, Some("not-a-date"), utc()),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(resolve_date_ms(None, Some("2024-02-30"), utc()).is_err());
    }

    #[test]
    fn month_range_covers_whole_local_month() {
        let (start, end) = month_range(3, 2024, utc()).unwrap();
        assert_eq!(start, MARCH_1_2024_UTC);
        assert_eq!(end, MARCH_1_2024_UTC + 31 * 86_400_000 - 1);

        let (feb_start, feb_end) = month_range(2, 2024, utc()).unwrap();
        assert_eq!(feb_end + 1, MARCH_1_2024_UTC);
        assert_eq!((feb_end + 1 - feb_start) / 86_400_000, 29);

        let (dec_start, dec_end) = month_range(12, 2023, utc()).unwrap();
        assert_eq!(iso_ms(dec_start), "2023-12-01T00:00:00.000Z");
        assert_eq!(iso_ms(dec_end), "2023-12-31T23:59:59.999Z");
    }

    #[test]
    fn month_range_shifts_with_offset() {
        let ist = offset_from_minutes(IST).unwrap();
        let (start, end) = month_range(3, 2024, ist).unwrap();
        assert_eq!(iso_ms(start), "2024-02-29T18:30:00.000Z");
        assert_eq!(iso_ms(end), "2024-03-31T18:29:59.999Z");
    }

    #[test]
    fn bad_month_or_offset_rejected() {
        assert!(month_range(0, 2024, utc()).is_err());
        assert!(month_range(13, 2024, utc()).is_err());
        assert!(month_range(1, i64::MAX, utc()).is_err());
        assert!(offset_from_minutes(15 * 60).is_err());
        assert!(offset_from_minutes(-13 * 60).is_err());
    }
}
