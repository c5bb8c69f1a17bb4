//! Core sample types carried over the databus
//!
//! # Key Types
//!
//! - **`Event`**: a named scalar reading (name, value, timestamp)
//! - **`Data`**: a named reading whose value is an arbitrary JSON document
//! - **`Metric`**: a scalar reading tagged with its downstream aggregation policy
//! - **`Message`**: anything that can travel over the bus (`Event` or `Data`)
//!
//! Timestamps are unix seconds as `f64`, matching the wire format.
//!
//! # Example
//!
//! ```rust
//! use kuba_databus::types::{Event, Message, Metric, MetricKind};
//!
//! let event = Event::new("cpu", 0.75, 1_700_000_000.0);
//! let metric = Metric::new(MetricKind::Counter, event.clone());
//! assert_eq!(metric.kind(), MetricKind::Counter);
//!
//! let msg = Message::from(event);
//! assert_eq!(msg.name(), "cpu");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum event name length in bytes
pub const MAX_EVENT_NAME_LEN: usize = 255;

/// Current wall-clock time as unix seconds
pub fn current_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A named scalar reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sample name
    pub name: String,
    /// Sample value
    pub value: f64,
    /// Unix timestamp in seconds
    pub timestamp: f64,
}

impl Event {
    /// Create a new event
    pub fn new(name: impl Into<String>, value: f64, timestamp: f64) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp,
        }
    }
}

/// A named reading carrying an arbitrary JSON value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    /// Sample name
    pub name: String,
    /// Arbitrary JSON payload
    pub value: serde_json::Value,
    /// Unix timestamp in seconds
    pub timestamp: f64,
}

impl Data {
    /// Create a new data sample
    pub fn new(name: impl Into<String>, value: serde_json::Value, timestamp: f64) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp,
        }
    }
}

/// Aggregation policy tag of a [`Metric`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Instantaneous value
    Gauge,
    /// Value reset on every read
    Absolute,
    /// Rate of change, may decrease
    Derive,
    /// Monotonic counter
    Counter,
}

impl MetricKind {
    /// All metric kinds
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Gauge,
        MetricKind::Absolute,
        MetricKind::Derive,
        MetricKind::Counter,
    ];

    /// The `type` tag used in JSON records
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Absolute => "absolute",
            MetricKind::Derive => "derive",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "absolute" => Ok(MetricKind::Absolute),
            "derive" => Ok(MetricKind::Derive),
            "counter" => Ok(MetricKind::Counter),
            other => Err(format!("unknown metric type: {}", other)),
        }
    }
}

/// A scalar reading tagged with its aggregation policy
///
/// The variant is the only semantic difference between metrics; the
/// reading itself has the same shape in every case.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    /// Instantaneous value
    Gauge(Event),
    /// Value reset on every read
    Absolute(Event),
    /// Rate of change, may decrease
    Derive(Event),
    /// Monotonic counter
    Counter(Event),
}

impl Metric {
    /// Build the variant matching `kind`
    pub fn new(kind: MetricKind, reading: Event) -> Self {
        match kind {
            MetricKind::Gauge => Metric::Gauge(reading),
            MetricKind::Absolute => Metric::Absolute(reading),
            MetricKind::Derive => Metric::Derive(reading),
            MetricKind::Counter => Metric::Counter(reading),
        }
    }

    /// The variant tag
    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Gauge(_) => MetricKind::Gauge,
            Metric::Absolute(_) => MetricKind::Absolute,
            Metric::Derive(_) => MetricKind::Derive,
            Metric::Counter(_) => MetricKind::Counter,
        }
    }

    /// The underlying reading
    pub fn reading(&self) -> &Event {
        match self {
            Metric::Gauge(e) | Metric::Absolute(e) | Metric::Derive(e) | Metric::Counter(e) => e,
        }
    }

    /// Consume the metric, returning the underlying reading
    pub fn into_reading(self) -> Event {
        match self {
            Metric::Gauge(e) | Metric::Absolute(e) | Metric::Derive(e) | Metric::Counter(e) => e,
        }
    }
}

/// A decoded sample travelling over the bus
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Scalar event
    Event(Event),
    /// JSON-valued data point
    Data(Data),
}

impl Message {
    /// Sample name
    pub fn name(&self) -> &str {
        match self {
            Message::Event(e) => &e.name,
            Message::Data(d) => &d.name,
        }
    }

    /// Sample timestamp
    pub fn timestamp(&self) -> f64 {
        match self {
            Message::Event(e) => e.timestamp,
            Message::Data(d) => d.timestamp,
        }
    }

    /// The event, if this message is one
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Message::Event(e) => Some(e),
            Message::Data(_) => None,
        }
    }
}

impl From<Event> for Message {
    fn from(e: Event) -> Self {
        Message::Event(e)
    }
}

impl From<Data> for Message {
    fn from(d: Data) -> Self {
        Message::Data(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_kind_parse() {
        for kind in MetricKind::ALL {
            assert_eq!(kind.as_str().parse::<MetricKind>().unwrap(), kind);
        }
        assert!("Gauge".parse::<MetricKind>().is_err());
        assert!("histogram".parse::<MetricKind>().is_err());
    }

    #[test]
    fn test_metric_variants_keep_reading() {
        let reading = Event::new("requests", 42.0, 10.0);
        for kind in MetricKind::ALL {
            let metric = Metric::new(kind, reading.clone());
            assert_eq!(metric.kind(), kind);
            assert_eq!(metric.reading(), &reading);
        }
    }

    #[test]
    fn test_message_accessors() {
        let msg = Message::from(Data::new("cfg", serde_json::json!({"a": 1}), 5.0));
        assert_eq!(msg.name(), "cfg");
        assert_eq!(msg.timestamp(), 5.0);
        assert!(msg.as_event().is_none());
    }
}
