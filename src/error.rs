//! Error types for the databus and storage layers

use crate::protocol::ParseError;
use std::io;
use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Wire or JSON decoding error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// Slot or calendar addressing error
    #[error("Addressing error: {0}")]
    Addressing(#[from] AddressingError),

    /// Datagram transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Addressing errors
///
/// Out-of-range inputs are always rejected; nothing is wrapped or clamped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AddressingError {
    /// Hour outside 0..=23
    #[error("Invalid range (0 <= hour < 24): {0}")]
    HourOutOfRange(u32),

    /// Minute outside 0..=59
    #[error("Invalid range (0 <= minute < 60): {0}")]
    MinuteOutOfRange(u32),

    /// Slot outside 0..=1439
    #[error("Invalid range (0 <= slot < 1440): {0}")]
    SlotOutOfRange(u32),

    /// Timestamp is not finite or not representable as a date
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(f64),

    /// Calendar date does not exist
    #[error("Invalid date: {year:04}-{month:02}-{day:02}")]
    InvalidDate {
        /// Year
        year: i32,
        /// Month
        month: u32,
        /// Day
        day: u32,
    },

    /// Ingest line does not follow `host|service||field|value...`
    #[error("Malformed ingest line: {0}")]
    MalformedLine(String),
}

/// Datagram transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Socket stayed busy for every attempt
    #[error("Socket would block after {attempts} attempts")]
    WouldBlock {
        /// Number of send attempts made
        attempts: u32,
    },

    /// Any other socket failure
    #[error("Socket error: {0}")]
    Io(#[from] io::Error),

    /// The peer endpoint is gone or refuses datagrams
    #[error("Not connected to {0}")]
    NotConnected(String),

    /// The databus service task has stopped
    #[error("Databus service stopped")]
    ServiceStopped,
}

impl TransportError {
    /// Transient failures leave the connection usable
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::WouldBlock { .. })
    }
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend rejected or failed the operation
    #[error("Backend error: {0}")]
    Backend(String),

    /// Redis command failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Write was not acknowledged by enough replicas
    #[error("Consistency level not met: required {required} acks, got {acknowledged}")]
    ConsistencyNotMet {
        /// Replica acknowledgements required
        required: usize,
        /// Replica acknowledgements received
        acknowledged: usize,
    },

    /// Sample could not be addressed
    #[error("Addressing error: {0}")]
    Addressing(#[from] AddressingError),
}

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_classification() {
        assert!(TransportError::WouldBlock { attempts: 3 }.is_transient());
        let fatal = TransportError::from(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(!fatal.is_transient());
        assert!(!TransportError::NotConnected("relay.sock".into()).is_transient());
    }

    #[test]
    fn test_error_wrapping() {
        let err: Error = AddressingError::SlotOutOfRange(1440).into();
        assert!(err.to_string().contains("1440"));

        let err: Error = StorageError::from(AddressingError::HourOutOfRange(24)).into();
        assert!(matches!(err, Error::Storage(StorageError::Addressing(_))));
    }
}
