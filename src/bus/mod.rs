//! Datagram databus
//!
//! Peers exchange `;`-terminated wire frames over unix datagram sockets.
//! Outbound messages go through a relay endpoint; inbound datagrams are
//! decoded and fanned out to every attached [`Consumer`].
//!
//! ```text
//! DatabusHandle --mpsc--> DatabusService --owns--> Databus
//!                              |                     |-- Relay (outbound)
//!                              |                     `-- consumers (Weak)
//!                              `-- listener socket (inbound)
//! ```
//!
//! The [`Databus`] holds the state machine and the outbound queue. The
//! [`DatabusService`] owns the sockets, drives reconnection and feeds the
//! databus from a single task.

pub mod databus;
pub mod relay;
pub mod service;

use crate::error::TransportError;
use crate::types::Message;

pub use databus::{Databus, DatabusConfig, DatabusStats, OverflowStrategy};
pub use relay::{Relay, MAX_SEND_ATTEMPTS};
pub use service::{DatabusHandle, DatabusService};

/// Receiver of decoded broadcasts
///
/// Registrations are weak: dropping the last `Arc` of a consumer detaches
/// it on the next delivery.
pub trait Consumer: Send + Sync {
    /// Called with every message decoded from one datagram
    fn on_broadcast(&self, messages: &[Message]);
}

/// Outbound packet sink
pub trait Transport: Send {
    /// Send one packet
    ///
    /// A transient error leaves the transport usable; any other error
    /// means the connection is gone.
    fn send(&self, packet: &[u8]) -> Result<(), TransportError>;
}

/// Databus connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No transport; outbound messages are queued
    #[default]
    Disconnected,
    /// A connection attempt is in progress
    Connecting,
    /// Transport is live
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}
