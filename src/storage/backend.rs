//! Storage backend trait
//!
//! A backend stores one day row per `(host, service, date)`. Inside a row,
//! each field maps slots to scalar values.

use super::address::RowKey;
use super::slot::Slot;
use super::ConsistencyLevel;
use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Contents of one day row: field -> slot -> value
pub type RowData = BTreeMap<String, BTreeMap<Slot, f64>>;

/// Pluggable day-row store
///
/// Implementations must be safe for concurrent use by independent tasks;
/// the storage engine performs no locking around writes.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Unique identifier for this backend
    fn backend_id(&self) -> &str;

    /// Write one value at `row`, `field`, `slot`
    async fn insert(
        &self,
        row: &RowKey,
        field: &str,
        slot: Slot,
        value: f64,
        consistency: ConsistencyLevel,
    ) -> Result<(), StorageError>;

    /// Read every field of a row; a missing row is empty
    async fn fetch_row(&self, row: &RowKey) -> Result<RowData, StorageError>;
}
