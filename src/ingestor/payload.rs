//! Raw result payload access
//!
//! A W-phase result is a loosely structured JSON document. Every access
//! goes through a [`FieldSpec`] that names the section, the key, the target
//! field, the coercion and whether the field is required, so the
//! required/optional policy is visible at each read site.

use serde_json::{Map, Value};
use tracing::info;

use crate::errors::{CoercionError, NormalizationError};
use crate::models::Field;
use crate::utils::datetime::DateTimeParser;
use chrono::{DateTime, Utc};

/// Key of the section holding the moment tensor fit
pub const SOLUTION_SECTION: &str = "MomentTensor";
/// Key of the section holding inversion quality metrics
pub const QUALITY_SECTION: &str = "QualityParams";
/// Key of the section describing the triggering event
pub const EVENT_SECTION: &str = "Event";
/// Top-level key whose mere presence marks a centroid solution
pub const CENTROID_MARKER: &str = "Centroid";
/// Top-level key carrying a processing error
pub const ERROR_KEY: &str = "Error";
/// Top-level key carrying the processing stack trace
pub const STACKTRACE_KEY: &str = "StackTrace";
/// Top-level key carrying processing warnings
pub const WARNINGS_KEY: &str = "Warnings";
/// Top-level key naming the host that produced the result
pub const HOST_NAME_KEY: &str = "HostName";

/// Payload sections a field can be read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Solution,
    Quality,
    Event,
}

impl Section {
    pub fn key(&self) -> &'static str {
        match self {
            Section::Solution => SOLUTION_SECTION,
            Section::Quality => QUALITY_SECTION,
            Section::Event => EVENT_SECTION,
        }
    }
}

/// The untyped result document, read-only
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    root: Value,
}

impl RawResult {
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::from_value(serde_json::from_str(json)?))
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Whether a top-level key is present, whatever its value
    pub fn has_key(&self, key: &str) -> bool {
        self.root.as_object().is_some_and(|map| map.contains_key(key))
    }

    /// A section as a JSON object, if present and an object
    pub fn section(&self, section: Section) -> Option<&Map<String, Value>> {
        self.root.get(section.key()).and_then(Value::as_object)
    }

    /// Look up `key` in `section`; absent section and absent key are both `None`
    pub fn lookup(&self, section: Section, key: &str) -> Option<&Value> {
        self.section(section).and_then(|map| map.get(key))
    }

    /// Whether the result carries a moment tensor section
    pub fn has_solution(&self) -> bool {
        self.has_key(SOLUTION_SECTION)
    }
}

/// Coercion from a JSON value into a field type
pub type Coercion<T> = fn(&Value) -> Result<T, CoercionError>;

/// Whether a field must be present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

/// How one field is read from the payload
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec<T> {
    /// Field name in the normalized solution
    pub field: &'static str,
    /// Key in the payload section
    pub key: &'static str,
    pub section: Section,
    pub presence: Presence,
    pub coerce: Coercion<T>,
}

impl<T> FieldSpec<T> {
    pub const fn required(field: &'static str, key: &'static str, coerce: Coercion<T>) -> Self {
        Self {
            field,
            key,
            section: Section::Solution,
            presence: Presence::Required,
            coerce,
        }
    }

    pub const fn optional(field: &'static str, key: &'static str, coerce: Coercion<T>) -> Self {
        Self {
            field,
            key,
            section: Section::Solution,
            presence: Presence::Optional,
            coerce,
        }
    }

    /// Read from a sibling section instead of the solution section
    pub const fn in_section(mut self, section: Section) -> Self {
        self.section = section;
        self
    }

    /// Read a required field; absence or coercion failure aborts normalization
    pub fn require(&self, raw: &RawResult) -> Result<T, NormalizationError> {
        debug_assert_eq!(self.presence, Presence::Required, "{} is optional", self.field);
        let value = raw
            .lookup(self.section, self.key)
            .ok_or(NormalizationError::MissingField {
                field: self.field,
                key: self.key,
                section: self.section.key(),
            })?;

        (self.coerce)(value).map_err(|source| NormalizationError::Coercion {
            field: self.field,
            key: self.key,
            section: self.section.key(),
            source,
        })
    }

    /// Read an optional field; absence is logged and recorded, never defaulted
    pub fn read_optional(&self, raw: &RawResult) -> Field<T> {
        debug_assert_eq!(self.presence, Presence::Optional, "{} is required", self.field);
        match raw.lookup(self.section, self.key) {
            Some(value) => (self.coerce)(value),
            None => {
                info!(
                    "Optional field absent: field={} key={} section={}",
                    self.field,
                    self.key,
                    self.section.key()
                );
                Err(CoercionError::Missing)
            }
        }
    }
}

fn type_name(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}

/// IEEE double from a JSON number or a numeric string
pub fn coerce_f64(value: &Value) -> Result<f64, CoercionError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| CoercionError::Unparseable {
            expected: "float",
            value: n.to_string(),
        }),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| CoercionError::Unparseable {
            expected: "float",
            value: s.clone(),
        }),
        other => Err(CoercionError::WrongType {
            expected: "float",
            found: type_name(other),
        }),
    }
}

/// Signed integer from a JSON integer, an integral float or an integer string
///
/// Fractional values are rejected rather than truncated.
pub fn coerce_i64(value: &Value) -> Result<i64, CoercionError> {
    let unparseable = || CoercionError::Unparseable {
        expected: "integer",
        value: value.to_string(),
    };

    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                _ => Err(unparseable()),
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| unparseable()),
        other => Err(CoercionError::WrongType {
            expected: "integer",
            found: type_name(other),
        }),
    }
}

/// String from a JSON string
pub fn coerce_string(value: &Value) -> Result<String, CoercionError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(CoercionError::WrongType {
            expected: "string",
            found: type_name(other),
        }),
    }
}

/// UTC timestamp from a JSON string
pub fn coerce_timestamp(value: &Value) -> Result<DateTime<Utc>, CoercionError> {
    let text = coerce_string(value).map_err(|_| CoercionError::WrongType {
        expected: "timestamp",
        found: type_name(value),
    })?;
    DateTimeParser::parse_flexible(&text).map_err(|_| CoercionError::Unparseable {
        expected: "timestamp",
        value: text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DIP1: FieldSpec<f64> = FieldSpec::required("dip1", "dip1", coerce_f64);
    const STATIONS: FieldSpec<i64> =
        FieldSpec::optional("usedStationCount", "number_of_stations", coerce_i64)
            .in_section(Section::Quality);

    #[test]
    fn test_required_field_missing() {
        let raw = RawResult::from_value(json!({"MomentTensor": {}}));
        let err = DIP1.require(&raw).unwrap_err();
        assert_eq!(
            err,
            NormalizationError::MissingField {
                field: "dip1",
                key: "dip1",
                section: "MomentTensor",
            }
        );
    }

    #[test]
    fn test_required_field_coercion_failure() {
        let raw = RawResult::from_value(json!({"MomentTensor": {"dip1": "steep"}}));
        assert!(matches!(
            DIP1.require(&raw),
            Err(NormalizationError::Coercion { field: "dip1", .. })
        ));
    }

    #[test]
    fn test_optional_field_from_sibling_section() {
        let raw = RawResult::from_value(json!({"QualityParams": {"number_of_stations": 40}}));
        assert_eq!(STATIONS.read_optional(&raw), Ok(40));

        let empty = RawResult::from_value(json!({}));
        assert_eq!(STATIONS.read_optional(&empty), Err(CoercionError::Missing));
    }

    #[test]
    fn test_zero_is_not_absent() {
        let raw = RawResult::from_value(json!({"QualityParams": {"number_of_stations": 0}}));
        assert_eq!(STATIONS.read_optional(&raw), Ok(0));
    }

    #[test]
    fn test_coerce_f64() {
        assert_eq!(coerce_f64(&json!(7.1)), Ok(7.1));
        assert_eq!(coerce_f64(&json!(10)), Ok(10.0));
        assert_eq!(coerce_f64(&json!(" 1.5e19 ")), Ok(1.5e19));
        assert!(matches!(
            coerce_f64(&json!(true)),
            Err(CoercionError::WrongType { expected: "float", .. })
        ));
        assert!(matches!(
            coerce_f64(&json!("abc")),
            Err(CoercionError::Unparseable { .. })
        ));
    }

    #[test]
    fn test_coerce_i64_rejects_fractions() {
        assert_eq!(coerce_i64(&json!(40)), Ok(40));
        assert_eq!(coerce_i64(&json!(40.0)), Ok(40));
        assert_eq!(coerce_i64(&json!("-3")), Ok(-3));
        assert!(coerce_i64(&json!(40.5)).is_err());
        assert!(coerce_i64(&json!("40.5")).is_err());
        assert!(coerce_i64(&json!(null)).is_err());
    }

    #[test]
    fn test_coerce_timestamp() {
        let ts = coerce_timestamp(&json!("2020-01-01 00:00:00.000000")).unwrap();
        assert_eq!(ts.timestamp(), 1_577_836_800);
        assert!(coerce_timestamp(&json!(1577836800)).is_err());
        assert!(coerce_timestamp(&json!("soon")).is_err());
    }

    #[test]
    fn test_marker_presence_ignores_value() {
        let raw = RawResult::from_value(json!({"Centroid": null}));
        assert!(raw.has_key(CENTROID_MARKER));
        assert!(!raw.has_solution());
    }
}
