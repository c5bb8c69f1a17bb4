//! Time-bucketed storage addressing
//!
//! Samples are stored in one row per `(host, service, day)` under the key
//! `"{host}:{service}:{YYYYMMDD}"`. Inside a row every field holds up to
//! 1440 values, one per minute slot.
//!
//! # Example
//!
//! ```rust
//! use kuba_databus::storage::{MemoryBackend, StorageConfig, StorageEngine, TimeBasis};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), kuba_databus::error::StorageError> {
//! let config = StorageConfig { time_basis: TimeBasis::Utc, ..Default::default() };
//! let engine = StorageEngine::new(Arc::new(MemoryBackend::new()), config);
//!
//! engine.store("web01", "nginx", "requests", 42.0, 1_700_000_000.0).await?;
//! let day = engine.retrieve("web01", "nginx", 1_700_000_000.0).await?;
//! assert_eq!(day["requests"][1333], Some(42.0));
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod backend;
pub mod engine;
pub mod memory;
pub mod redis;
pub mod slot;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use crate::error::{AddressingError, StorageError};
pub use address::{norm_field, norm_hostname, norm_key, norm_service, IngestLine, RowKey};
pub use backend::{RowData, StorageBackend};
pub use engine::{DaySeries, StorageConfig, StorageEngine};
pub use memory::MemoryBackend;
pub use self::redis::{RedisBackend, RedisBackendConfig};
pub use slot::{slot_to_time, slot_to_timestamp, time_to_slot, Slot, SLOTS_PER_DAY};

/// Write durability level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyLevel {
    /// Acknowledged by the primary alone
    #[default]
    One,
    /// Acknowledged by a majority of copies
    Quorum,
    /// Acknowledged by every copy
    All,
}

impl ConsistencyLevel {
    /// Replica acknowledgements needed beyond the primary
    pub fn required_acks(&self, replicas: usize) -> usize {
        match self {
            ConsistencyLevel::One => 0,
            // Majority of replicas + 1 copies, minus the primary
            ConsistencyLevel::Quorum => (replicas + 1) / 2,
            ConsistencyLevel::All => replicas,
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyLevel::One => write!(f, "one"),
            ConsistencyLevel::Quorum => write!(f, "quorum"),
            ConsistencyLevel::All => write!(f, "all"),
        }
    }
}

impl FromStr for ConsistencyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "one" => Ok(ConsistencyLevel::One),
            "quorum" => Ok(ConsistencyLevel::Quorum),
            "all" => Ok(ConsistencyLevel::All),
            other => Err(format!("unknown consistency level: {}", other)),
        }
    }
}

/// Calendar used to derive day keys and slots from timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBasis {
    /// Host local time
    #[default]
    Local,
    /// Coordinated universal time
    Utc,
}

impl FromStr for TimeBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(TimeBasis::Local),
            "utc" => Ok(TimeBasis::Utc),
            other => Err(format!("unknown time basis: {}", other)),
        }
    }
}
