//! Timestamp utilities

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};

/// Date layout used by the video source for upload dates
const UPLOAD_DATE_FORMAT: &str = "%Y%m%d";

/// Feed publish date layout (RFC 2822 with a literal GMT zone)
const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a source upload date (`YYYYMMDD`) to a feed publish date
pub fn format_upload_date(upload_date: &str) -> Result<String> {
    let date = NaiveDate::parse_from_str(upload_date.trim(), UPLOAD_DATE_FORMAT)
        .map_err(|e| Error::InvalidInput(format!("upload date '{}': {}", upload_date, e)))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::Internal(format!("no midnight for {}", date)))?;
    Ok(midnight.and_utc().format(PUB_DATE_FORMAT).to_string())
}

/// Parse a feed publish date for ordering; `None` when blank or malformed
pub fn parse_pub_date(pub_date: &str) -> Option<DateTime<Utc>> {
    if pub_date.trim().is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(pub_date.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_format_upload_date() {
        assert_eq!(
            format_upload_date("20240131").unwrap(),
            "Wed, 31 Jan 2024 00:00:00 GMT"
        );
        assert_eq!(
            format_upload_date(" 20060102\n").unwrap(),
            "Mon, 02 Jan 2006 00:00:00 GMT"
        );
    }

    #[test]
    fn test_format_upload_date_rejects_garbage() {
        assert!(format_upload_date("NA").is_err());
        assert!(format_upload_date("20241340").is_err());
        assert!(format_upload_date("").is_err());
    }

    #[test]
    fn test_parse_pub_date_round_trips_formatted_dates() {
        let formatted = format_upload_date("20231105").unwrap();
        let parsed = parse_pub_date(&formatted).unwrap();

        assert_eq!(parsed.year(), 2023);
        assert_eq!(parsed.month(), 11);
        assert_eq!(parsed.day(), 5);
        assert_eq!(parsed.hour(), 0);
    }

    #[test]
    fn test_parse_pub_date_blank_or_malformed() {
        assert!(parse_pub_date("").is_none());
        assert!(parse_pub_date("   ").is_none());
        assert!(parse_pub_date("yesterday").is_none());
    }
}
