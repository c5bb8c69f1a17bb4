//! Slot-addressed storage engine
//!
//! Maps `(host, service, field, timestamp)` samples onto day rows and
//! one-minute slots, and reshapes day rows back into fixed-length series.
//! Failures are returned to the caller untouched; retry policy belongs to
//! the caller (see [`crate::resilience`]).

use super::address::{norm_field, IngestLine, RowKey};
use super::backend::StorageBackend;
use super::slot::{calendar_address, SLOTS_PER_DAY};
use super::{ConsistencyLevel, TimeBasis};
use crate::error::StorageError;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// One day of values per field, indexed by slot; missing slots are `None`
pub type DaySeries = BTreeMap<String, Vec<Option<f64>>>;

/// Storage engine configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageConfig {
    /// Consistency level for writes
    pub consistency: ConsistencyLevel,
    /// Calendar used to derive day keys and slots
    pub time_basis: TimeBasis,
}

/// Addressing layer over a [`StorageBackend`]
#[derive(Clone)]
pub struct StorageEngine {
    backend: Arc<dyn StorageBackend>,
    config: StorageConfig,
}

impl StorageEngine {
    /// Create an engine over `backend`
    pub fn new(backend: Arc<dyn StorageBackend>, config: StorageConfig) -> Self {
        Self { backend, config }
    }

    /// Engine configuration
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Store one value
    pub async fn store(
        &self,
        host: &str,
        service: &str,
        field: &str,
        value: f64,
        timestamp: f64,
    ) -> Result<(), StorageError> {
        let (date, slot) = calendar_address(timestamp, self.config.time_basis)?;
        let row = RowKey::new(host, service, date);
        let field = norm_field(field);

        let start = Instant::now();
        self.backend
            .insert(&row, &field, slot, value, self.config.consistency)
            .await?;

        debug!(
            row = %row,
            field = %field,
            slot = %slot,
            value,
            backend = self.backend.backend_id(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Wrote data point"
        );
        Ok(())
    }

    /// Store every field of a `host|service||field|value||...` line
    ///
    /// Fields are written one by one; a failure stops the line and leaves
    /// fields already written in place. Returns the number of fields written.
    pub async fn store_line(&self, line: &str, timestamp: f64) -> Result<usize, StorageError> {
        let parsed = IngestLine::parse(line)?;
        let (date, slot) = calendar_address(timestamp, self.config.time_basis)?;
        let row = RowKey::new(&parsed.host, &parsed.service, date);

        let start = Instant::now();
        for (field, value) in &parsed.points {
            self.backend
                .insert(&row, field, slot, *value, self.config.consistency)
                .await?;
        }

        debug!(
            row = %row,
            fields = parsed.points.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Wrote ingest line"
        );
        Ok(parsed.points.len())
    }

    /// Read the day row containing `timestamp`
    pub async fn retrieve(
        &self,
        host: &str,
        service: &str,
        timestamp: f64,
    ) -> Result<DaySeries, StorageError> {
        let (date, _) = calendar_address(timestamp, self.config.time_basis)?;
        let row = RowKey::new(host, service, date);
        let data = self.backend.fetch_row(&row).await?;

        let series = data
            .into_iter()
            .map(|(field, slots)| {
                let mut values = vec![None; SLOTS_PER_DAY];
                for (slot, value) in slots {
                    values[slot.index() as usize] = Some(value);
                }
                (field, values)
            })
            .collect();

        Ok(series)
    }
}
