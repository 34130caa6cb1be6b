//! Shared parsing helpers every venue parser uses to convert raw venue
//! strings into validated domain values.

use chrono::{DateTime, Utc};

use crate::error::ListenerError;

/// Parse a venue numeric string into a finite `f64`, rejecting NaN/Inf.
pub fn parse_finite_f64(raw: &str) -> Result<f64, ListenerError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| ListenerError::MalformedPayload(format!("not a number: '{raw}'")))?;
    if !value.is_finite() {
        return Err(ListenerError::MalformedPayload(format!(
            "non-finite number: '{raw}'"
        )));
    }
    Ok(value)
}

/// Parse an RFC 3339 venue timestamp, normalising to UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ListenerError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ListenerError::MalformedPayload(format!("unparseable timestamp: '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nan_and_infinity() {
        assert!(parse_finite_f64("NaN").is_err());
        assert!(parse_finite_f64("inf").is_err());
        assert!(parse_finite_f64("-inf").is_err());
    }

    #[test]
    fn accepts_finite_numbers() {
        assert_eq!(parse_finite_f64("12.34").unwrap(), 12.34);
    }

    #[test]
    fn parses_utc_timestamp() {
        let ts = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn rejects_unparseable_timestamp() {
        assert!(parse_timestamp("not-a-date").is_err());
    }
}
