//! Datetime parsing and formatting utilities
//!
//! Result payloads carry origin times as naive UTC strings
//! (`2020-01-01 00:00:00.000000`), while the archive and the bus want
//! RFC 3339 with microsecond precision. Both conversions live here.
//!
//! # Usage
//!
//! ```rust
//! use wphase_publish::utils::datetime::DateTimeParser;
//!
//! let dt = DateTimeParser::parse_flexible("2020-01-01 00:00:00.000000").unwrap();
//! assert_eq!(DateTimeParser::format_for_archive(&dt), "2020-01-01T00:00:00.000000Z");
//! ```

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Errors that can occur during datetime operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DateTimeError {
    /// Invalid datetime format provided
    #[error("Invalid datetime format: '{input}' - expected RFC3339 or naive UTC")]
    InvalidFormat { input: String },
}

/// Datetime parsing and formatting helpers
pub struct DateTimeParser;

impl DateTimeParser {
    /// Parse a datetime from the formats found in result payloads
    ///
    /// Supports:
    /// - RFC3339 with timezone or offset: "2020-01-01T00:00:00Z"
    /// - naive UTC with optional fraction: "2020-01-01 00:00:00.000000"
    /// - naive ISO 8601 with optional fraction: "2020-01-01T00:00:00.5"
    pub fn parse_flexible(datetime_str: &str) -> Result<DateTime<Utc>, DateTimeError> {
        let trimmed = datetime_str.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(dt.with_timezone(&Utc));
        }

        // `%.f` also accepts a missing fraction
        let naive_formats = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

        for format in &naive_formats {
            if let Ok(naive_dt) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(DateTime::from_naive_utc_and_offset(naive_dt, Utc));
            }
        }

        Err(DateTimeError::InvalidFormat {
            input: datetime_str.to_string(),
        })
    }

    /// Format a datetime for the archive and bus messages (microsecond precision)
    pub fn format_for_archive(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Get current UTC time
    pub fn now_utc() -> DateTime<Utc> {
        Utc::now()
    }
}
