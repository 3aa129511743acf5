//! CLI command implementations.

pub mod dlq;
pub mod list;
pub mod purge;
pub mod replay;
pub mod send;

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};

/// Parse an operator-supplied point in time.
///
/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(date) = value.parse::<NaiveDate>() {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(DateTime::from_naive_utc_and_offset(midnight, Utc));
        }
    }
    bail!("could not parse '{}' as an RFC 3339 timestamp or YYYY-MM-DD date", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339() {
        let ts = parse_time("2026-08-06T12:30:00Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-08-06T12:30:00+00:00");
    }

    #[test]
    fn test_parse_bare_date() {
        let ts = parse_time("2026-08-06").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-08-06T00:00:00+00:00");
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_time("yesterday-ish").is_err());
    }
}
