//! Outbound relay socket

use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use super::Transport;
use crate::error::TransportError;
use crate::resilience::RetryPolicy;

/// Send attempts before a busy socket is reported
pub const MAX_SEND_ATTEMPTS: u32 = 3;

/// Non-blocking datagram socket connected to one fixed endpoint
///
/// A send that would block is retried immediately, up to
/// [`MAX_SEND_ATTEMPTS`] times. The socket closes when the relay drops.
#[derive(Debug)]
pub struct Relay {
    socket: UnixDatagram,
    endpoint: PathBuf,
    retry: RetryPolicy,
}

impl Relay {
    /// Connect to the datagram socket at `endpoint`
    ///
    /// Fails if nothing is bound there.
    pub fn connect(endpoint: impl AsRef<Path>) -> Result<Self, TransportError> {
        let endpoint = endpoint.as_ref().to_path_buf();
        let socket = UnixDatagram::unbound()?;
        socket.connect(&endpoint)?;
        socket.set_nonblocking(true)?;

        debug!(endpoint = %endpoint.display(), "Relay connected");

        Ok(Self {
            socket,
            endpoint,
            retry: RetryPolicy::new(MAX_SEND_ATTEMPTS - 1, Duration::ZERO),
        })
    }

    /// Path of the connected endpoint
    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }

    /// Send one packet
    pub fn relay(&self, packet: &[u8]) -> Result<(), TransportError> {
        self.retry
            .run_if(
                |e: &io::Error| e.kind() == io::ErrorKind::WouldBlock,
                || self.socket.send(packet),
            )
            .map(|_| ())
            .map_err(|e| {
                match e.kind() {
                    io::ErrorKind::WouldBlock => TransportError::WouldBlock {
                        attempts: self.retry.max_attempts(),
                    },
                    io::ErrorKind::ConnectionRefused | io::ErrorKind::NotConnected => {
                        TransportError::NotConnected(self.endpoint.display().to_string())
                    },
                    _ => TransportError::Io(e),
                }
            })
    }

    /// Tell the endpoint where `peer` listens
    ///
    /// Used against a multicast endpoint so it starts forwarding traffic
    /// to `peer`.
    pub fn announce(&self, peer: &Path) -> Result<(), TransportError> {
        debug!(endpoint = %self.endpoint.display(), peer = %peer.display(), "Announcing peer");
        self.relay(peer.as_os_str().as_bytes())
    }
}

impl Transport for Relay {
    fn send(&self, packet: &[u8]) -> Result<(), TransportError> {
        self.relay(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relay_delivers_packet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.sock");
        let receiver = UnixDatagram::bind(&path).unwrap();

        let relay = Relay::connect(&path).unwrap();
        assert_eq!(relay.endpoint(), path.as_path());
        relay.relay(b"event 1|a 1 2;").unwrap();

        let mut buf = [0u8; 64];
        let len = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"event 1|a 1 2;");
    }

    #[test]
    fn test_connect_to_missing_endpoint_fails() {
        let dir = TempDir::new().unwrap();
        let err = Relay::connect(dir.path().join("absent.sock")).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_closed_receiver_reports_not_connected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.sock");
        let receiver = UnixDatagram::bind(&path).unwrap();
        let relay = Relay::connect(&path).unwrap();
        drop(receiver);

        let err = relay.relay(b"event 1|a 1 2;").unwrap_err();
        assert!(matches!(err, TransportError::NotConnected(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_full_receiver_reports_would_block() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slow.sock");
        let _receiver = UnixDatagram::bind(&path).unwrap();
        let relay = Relay::connect(&path).unwrap();

        let packet = vec![b'x'; 1024];
        let mut outcome = None;
        for _ in 0..100_000 {
            if let Err(e) = relay.relay(&packet) {
                outcome = Some(e);
                break;
            }
        }

        match outcome {
            Some(TransportError::WouldBlock { attempts }) => {
                assert_eq!(attempts, MAX_SEND_ATTEMPTS)
            },
            other => panic!("expected WouldBlock, got {:?}", other),
        }
    }

    #[test]
    fn test_announce_sends_peer_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("multicast.sock");
        let receiver = UnixDatagram::bind(&path).unwrap();

        let relay = Relay::connect(&path).unwrap();
        relay.announce(Path::new("/run/databus/peer.sock")).unwrap();

        let mut buf = [0u8; 64];
        let len = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"/run/databus/peer.sock");
    }
}
