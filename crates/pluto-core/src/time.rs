//! Wall-clock timestamp codec for persisted rows
//!
//! Stored timestamps are plain strings in `HH:MM:SS DD/MM/YYYY` layout,
//! always rendered at UTC+3 regardless of the host time zone. Parsing reads
//! them back at the same offset and normalizes to UTC.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::error::{Error, Result};

/// Offset of the persisted wall clock, in seconds east of UTC
pub const STORE_UTC_OFFSET_SECS: i32 = 3 * 3600;

/// `strftime` layout of persisted timestamps
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S %d/%m/%Y";

fn store_offset() -> FixedOffset {
    FixedOffset::east_opt(STORE_UTC_OFFSET_SECS).expect("UTC+3 is within the valid offset range")
}

/// Render a UTC instant in the persisted wall-clock layout
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&store_offset())
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// Parse a persisted wall-clock string back into UTC
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| Error::timestamp(format!("'{}': {}", text, e)))?;

    store_offset()
        .from_local_datetime(&naive)
        .single()
        .map(|ts| ts.with_timezone(&Utc))
        .ok_or_else(|| Error::timestamp(format!("'{}' is ambiguous", text)))
}

/// Parse a persisted timestamp, falling back to now when it is unreadable
///
/// A bad timestamp never makes a device row unloadable.
pub(crate) fn parse_timestamp_or_now(text: &str) -> DateTime<Utc> {
    match parse_timestamp(text) {
        Ok(ts) => ts,
        Err(e) => {
            tracing::warn!("Error parsing time string: {}", e);
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn formats_at_fixed_offset() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 22, 15, 7).unwrap();
        // 22:15 UTC is already the next day at UTC+3
        assert_eq!(format_timestamp(ts), "01:15:07 10/03/2024");
    }

    #[test]
    fn parses_back_to_utc() {
        let parsed = parse_timestamp("01:15:07 10/03/2024").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 9, 22, 15, 7).unwrap());
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        assert!(parse_timestamp("  12:00:00 01/01/2025\n").is_ok());
    }

    #[test]
    fn drops_sub_second_precision() {
        let now = Utc::now();
        let restored = parse_timestamp(&format_timestamp(now)).unwrap();
        assert_eq!(restored, now.with_nanosecond(0).unwrap());
    }

    #[test]
    fn rejects_other_layouts() {
        assert!(parse_timestamp("2024-03-10 01:15:07").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn unreadable_timestamp_falls_back_to_now() {
        let before = Utc::now();
        let ts = parse_timestamp_or_now("not a time");
        assert!(ts >= before);
    }
}
