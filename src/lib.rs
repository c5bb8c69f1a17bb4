//! Kuba Databus - telemetry transport and minute-slot storage
//!
//! This library provides:
//! - A text wire protocol for `event`, `data` and `status` commands, plus
//!   JSON record and legacy line decoders
//! - A unix datagram databus that batches outbound messages through a
//!   relay and fans inbound frames out to attached consumers
//! - Day-row storage addressed by host, service, day and minute slot, with
//!   in-memory and Redis backends
//! - Failure-handling combinators for suppressing, logging and retrying

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

/// Wire, JSON and legacy decoders and the wire renderer
pub mod protocol;

/// Suppress, log and retry combinators
pub mod resilience;

/// Unix datagram databus: state machine, relay socket and service task
pub mod bus;

/// Slot addressing, normalization and storage backends
pub mod storage;

/// Consumer that persists bus events to storage
pub mod sink;

/// Configuration management with TOML support
pub mod config;

// Re-export main types
pub use bus::{Consumer, Databus, DatabusConfig, DatabusHandle, DatabusService};
pub use error::{Error, Result};
pub use storage::{StorageConfig, StorageEngine};
pub use types::{Data, Event, Message, Metric, MetricKind};
