//! Row addressing and name normalization
//!
//! Rows are keyed `"{host}:{service}:{YYYYMMDD}"`. Components are normalized
//! before they are joined so that the key stays unambiguous.

use crate::error::AddressingError;
use std::fmt;

/// Normalize a generic key component: trimmed, lowercase, no `:`
pub fn norm_key(key: &str) -> String {
    key.trim().to_lowercase().replace(':', "_")
}

/// Normalize a host name; `-` is folded to `_`
pub fn norm_hostname(host: &str) -> String {
    norm_key(host).replace('-', "_")
}

/// Normalize a service name
pub fn norm_service(service: &str) -> String {
    norm_key(service)
}

/// Normalize a field name
pub fn norm_field(field: &str) -> String {
    norm_key(field)
}

/// Day-partitioned row address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    host: String,
    service: String,
    date: String,
}

impl RowKey {
    /// Build a row key, normalizing host and service
    pub fn new(host: &str, service: &str, date: impl Into<String>) -> Self {
        Self {
            host: norm_hostname(host),
            service: norm_service(service),
            date: date.into(),
        }
    }

    /// Normalized host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Normalized service
    pub fn service(&self) -> &str {
        &self.service
    }

    /// `YYYYMMDD` day key
    pub fn date(&self) -> &str {
        &self.date
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.service, self.date)
    }
}

/// A parsed `host|service||field|value||field|value` line
#[derive(Debug, Clone, PartialEq)]
pub struct IngestLine {
    /// Normalized host
    pub host: String,
    /// Normalized service
    pub service: String,
    /// Normalized field names with their values, in line order
    pub points: Vec<(String, f64)>,
}

impl IngestLine {
    /// Parse an ingest line
    pub fn parse(line: &str) -> Result<Self, AddressingError> {
        let malformed = || AddressingError::MalformedLine(line.to_string());

        let mut sections = line.trim_end().split("||");
        let head = sections.next().ok_or_else(malformed)?;
        let (host, service) = head.split_once('|').ok_or_else(malformed)?;
        if host.is_empty() || service.is_empty() || service.contains('|') {
            return Err(malformed());
        }

        let mut points = Vec::new();
        for section in sections {
            let (field, value) = section.split_once('|').ok_or_else(malformed)?;
            let value = value.trim().parse::<f64>().map_err(|_| malformed())?;
            points.push((norm_field(field), value));
        }

        Ok(Self {
            host: norm_hostname(host),
            service: norm_service(service),
            points,
        })
    }
}
