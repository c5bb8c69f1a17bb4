//! In-memory storage backend
//!
//! Keeps rows in a `HashMap` behind a `parking_lot::RwLock`. Nothing is
//! persisted; intended for tests and embedded use.

use super::address::RowKey;
use super::backend::{RowData, StorageBackend};
use super::slot::Slot;
use super::ConsistencyLevel;
use crate::error::StorageError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Volatile day-row store
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: RwLock<HashMap<RowKey, RowData>>,
    writes: AtomicU64,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows held
    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    /// Total successful writes
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn backend_id(&self) -> &str {
        "memory"
    }

    async fn insert(
        &self,
        row: &RowKey,
        field: &str,
        slot: Slot,
        value: f64,
        _consistency: ConsistencyLevel,
    ) -> Result<(), StorageError> {
        self.rows
            .write()
            .entry(row.clone())
            .or_default()
            .entry(field.to_string())
            .or_default()
            .insert(slot, value);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn fetch_row(&self, row: &RowKey) -> Result<RowData, StorageError> {
        Ok(self.rows.read().get(row).cloned().unwrap_or_default())
    }
}
