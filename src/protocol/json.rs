//! JSON record decoder
//!
//! Decodes samples posted as JSON, either a single object or an array of
//! objects:
//!
//! ```json
//! [
//!   {"name": "cpu", "value": 0.5, "timestamp": 1700000000},
//!   {"value": 0.7}
//! ]
//! ```
//!
//! - `value` is required
//! - `name` may be omitted; when present it must equal the name the
//!   caller decodes for
//! - `timestamp` defaults to the current time
//! - metric records also require `type`, one of `gauge`, `absolute`,
//!   `derive` or `counter`
//!
//! # Example
//!
//! ```rust
//! use kuba_databus::protocol::json::parse_json_metric;
//! use kuba_databus::types::MetricKind;
//!
//! let metrics = parse_json_metric(r#"{"value": 3, "type": "counter"}"#, "hits").unwrap();
//! assert_eq!(metrics[0].kind(), MetricKind::Counter);
//! assert_eq!(metrics[0].reading().name, "hits");
//! ```

use serde_json::{Map, Value};

use super::error::{ParseError, ParseErrorKind};
use super::wire::{parse_double, DEFAULT_MAX_PACKET};
use crate::types::{current_timestamp, Data, Event, Metric, MetricKind};

/// Maximum number of records in a single JSON array
const MAX_ARRAY_RECORDS: usize = 100_000;

type Record = Map<String, Value>;

/// Decoder for JSON-bodied data and metric records
#[derive(Debug, Clone)]
pub struct JsonRecordDecoder {
    /// Maximum serialized size of a record value
    max_packet: usize,
    /// Maximum number of records in an array
    max_records: usize,
}

impl Default for JsonRecordDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonRecordDecoder {
    /// Create a decoder with default limits
    pub fn new() -> Self {
        Self {
            max_packet: DEFAULT_MAX_PACKET,
            max_records: MAX_ARRAY_RECORDS,
        }
    }

    /// Set the maximum serialized value size
    pub fn with_max_packet(mut self, max_packet: usize) -> Self {
        self.max_packet = max_packet;
        self
    }

    /// Set the maximum array size
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    /// Decode data records named `name`
    pub fn decode_data(&self, input: &str, name: &str) -> Result<Vec<Data>, ParseError> {
        self.records(input)?
            .into_iter()
            .map(|mut record| {
                let value = record.remove("value").ok_or_else(|| missing("value"))?;
                self.check_size(&value)?;
                let name = record_name(&record, name)?;
                let timestamp = record_timestamp(&record)?;
                Ok(Data::new(name, value, timestamp))
            })
            .collect()
    }

    /// Decode metric records named `name`
    pub fn decode_metrics(&self, input: &str, name: &str) -> Result<Vec<Metric>, ParseError> {
        self.records(input)?
            .into_iter()
            .map(|record| {
                let raw = record.get("value").ok_or_else(|| missing("value"))?;
                self.check_size(raw)?;
                let value = number(raw)?;
                let kind = record_kind(&record)?;
                let name = record_name(&record, name)?;
                let timestamp = record_timestamp(&record)?;
                Ok(Metric::new(kind, Event::new(name, value, timestamp)))
            })
            .collect()
    }

    fn records(&self, input: &str) -> Result<Vec<Record>, ParseError> {
        let parsed: Value = serde_json::from_str(input).map_err(|e| {
            ParseError::new(ParseErrorKind::InvalidJson {
                reason: e.to_string(),
            })
            .with_context(input)
        })?;

        match parsed {
            Value::Object(record) => Ok(vec![record]),
            Value::Array(items) => {
                if items.len() > self.max_records {
                    return Err(ParseError::new(ParseErrorKind::TooManyRecords {
                        count: items.len(),
                        max: self.max_records,
                    }));
                }
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(record) => Ok(record),
                        _ => Err(ParseError::new(ParseErrorKind::NotAnObject)),
                    })
                    .collect()
            },
            _ => Err(ParseError::new(ParseErrorKind::NotAnObject)),
        }
    }

    fn check_size(&self, value: &Value) -> Result<(), ParseError> {
        let size = value.to_string().len();
        if size > self.max_packet {
            return Err(ParseError::new(ParseErrorKind::PayloadTooLarge {
                size,
                max: self.max_packet,
            }));
        }
        Ok(())
    }
}

fn missing(field: &str) -> ParseError {
    ParseError::new(ParseErrorKind::MissingField {
        field: field.to_string(),
    })
}

fn record_name(record: &Record, name: &str) -> Result<String, ParseError> {
    match record.get("name") {
        None => Ok(name.to_string()),
        Some(Value::String(found)) if found == name => Ok(name.to_string()),
        Some(other) => Err(ParseError::new(ParseErrorKind::NameMismatch {
            expected: name.to_string(),
            found: other.as_str().map_or_else(|| other.to_string(), str::to_string),
        })),
    }
}

fn record_timestamp(record: &Record) -> Result<f64, ParseError> {
    match record.get("timestamp") {
        None => Ok(current_timestamp()),
        Some(raw) => number(raw),
    }
}

fn record_kind(record: &Record) -> Result<MetricKind, ParseError> {
    let raw = record.get("type").ok_or_else(|| missing("type"))?;
    let tag = raw.as_str().ok_or_else(|| {
        ParseError::new(ParseErrorKind::UnknownMetricType {
            found: raw.to_string(),
        })
    })?;
    tag.parse().map_err(|_| {
        ParseError::new(ParseErrorKind::UnknownMetricType {
            found: tag.to_string(),
        })
    })
}

/// A JSON number, or a string holding a number literal
fn number(raw: &Value) -> Result<f64, ParseError> {
    let invalid = || {
        ParseError::new(ParseErrorKind::InvalidNumber {
            literal: raw.to_string(),
        })
    };
    match raw {
        Value::Number(n) => n.as_f64().ok_or_else(invalid),
        Value::String(s) => match parse_double(s.trim()) {
            Ok((value, "")) => Ok(value),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}

/// Decode data records with default limits
pub fn parse_json_data(input: &str, name: &str) -> Result<Vec<Data>, ParseError> {
    JsonRecordDecoder::new().decode_data(input, name)
}

/// Decode metric records with default limits
pub fn parse_json_metric(input: &str, name: &str) -> Result<Vec<Metric>, ParseError> {
    JsonRecordDecoder::new().decode_metrics(input, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_single_object() {
        let data = parse_json_data(r#"{"name": "cfg", "value": {"a": [1, 2]}, "timestamp": 10}"#, "cfg")
            .unwrap();
        assert_eq!(data, vec![Data::new("cfg", json!({"a": [1, 2]}), 10.0)]);
    }

    #[test]
    fn test_data_array_with_defaults() {
        let before = current_timestamp();
        let data = parse_json_data(r#"[{"value": 1}, {"value": "x", "timestamp": 5}]"#, "n").unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].name, "n");
        assert!(data[0].timestamp >= before);
        assert_eq!(data[1].value, json!("x"));
        assert_eq!(data[1].timestamp, 5.0);
    }

    #[test]
    fn test_data_name_mismatch() {
        let err = parse_json_data(r#"{"name": "other", "value": 1}"#, "n").unwrap_err();
        assert!(err.is_type_mismatch());
        assert_eq!(
            err.kind,
            ParseErrorKind::NameMismatch {
                expected: "n".to_string(),
                found: "other".to_string()
            }
        );
    }

    #[test]
    fn test_data_missing_value() {
        let err = parse_json_data(r#"{"name": "n"}"#, "n").unwrap_err();
        assert!(err.is_syntax_error());
    }

    #[test]
    fn test_data_size_limit() {
        let decoder = JsonRecordDecoder::new().with_max_packet(8);
        let err = decoder
            .decode_data(r#"{"value": "0123456789"}"#, "n")
            .unwrap_err();
        assert!(err.is_size_limit());
    }

    #[test]
    fn test_record_count_limit() {
        let decoder = JsonRecordDecoder::new().with_max_records(1);
        let err = decoder.decode_data(r#"[{"value": 1}, {"value": 2}]"#, "n").unwrap_err();
        assert!(err.is_size_limit());
    }

    #[test]
    fn test_rejects_non_objects() {
        assert!(parse_json_data("3", "n").is_err());
        assert!(parse_json_data(r#"[{"value": 1}, 2]"#, "n").is_err());
        assert!(parse_json_data("{", "n").unwrap_err().is_syntax_error());
    }

    #[test]
    fn test_metric_kinds() {
        for kind in MetricKind::ALL {
            let input = format!(r#"{{"value": 1.5, "type": "{}", "timestamp": 2}}"#, kind);
            let metrics = parse_json_metric(&input, "m").unwrap();
            assert_eq!(metrics[0].kind(), kind);
            assert_eq!(metrics[0].reading(), &Event::new("m", 1.5, 2.0));
        }
    }

    #[test]
    fn test_metric_unknown_type() {
        let err = parse_json_metric(r#"{"value": 1, "type": "histogram"}"#, "m").unwrap_err();
        assert!(err.is_type_mismatch());

        let err = parse_json_metric(r#"{"value": 1, "type": 4}"#, "m").unwrap_err();
        assert!(err.is_type_mismatch());

        let err = parse_json_metric(r#"{"value": 1}"#, "m").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::MissingField { .. }));
    }

    #[test]
    fn test_metric_numeric_strings() {
        let metrics =
            parse_json_metric(r#"{"value": "2.5", "type": "gauge", "timestamp": "7"}"#, "m").unwrap();
        assert_eq!(metrics[0].reading(), &Event::new("m", 2.5, 7.0));

        let err = parse_json_metric(r#"{"value": "abc", "type": "gauge"}"#, "m").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidNumber { .. }));
    }
}
