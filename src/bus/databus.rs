//! Databus state machine and outbound queue

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::relay::Relay;
use super::{ConnectionState, Consumer, Transport};
use crate::protocol::{render_batch, CodecConfig, FrameReassembler, WireCodec};
use crate::types::Message;

/// What to drop when the outbound queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowStrategy {
    /// Drop the oldest queued message to make room
    #[default]
    DropOldest,
    /// Drop the incoming message
    DropNewest,
}

/// Databus configuration
#[derive(Debug, Clone)]
pub struct DatabusConfig {
    /// Socket this peer listens on for inbound datagrams
    pub listen_path: PathBuf,
    /// Relay endpoint outbound packets go to
    pub relay_path: PathBuf,
    /// Multicast endpoint told about `listen_path` on every connect
    pub announce_path: Option<PathBuf>,
    /// Wait before reconnecting after a failure
    pub reconnect_delay: Duration,
    /// Maximum messages per outbound packet
    pub batch_size: usize,
    /// Maximum queued outbound messages
    pub queue_limit: usize,
    /// Strategy when the queue is full
    pub overflow: OverflowStrategy,
    /// Receive buffer size, the largest accepted datagram
    pub recv_buffer_size: usize,
    /// Capacity of the command channel
    pub command_buffer: usize,
    /// Wire codec limits
    pub codec: CodecConfig,
}

impl Default for DatabusConfig {
    fn default() -> Self {
        Self {
            listen_path: PathBuf::from("/run/databus/peer.sock"),
            relay_path: PathBuf::from("/run/databus/relay.sock"),
            announce_path: None,
            reconnect_delay: Duration::from_secs(1),
            batch_size: 10,
            queue_limit: 100_000,
            overflow: OverflowStrategy::DropOldest,
            recv_buffer_size: 32 * 1024,
            command_buffer: 1024,
            codec: CodecConfig::default(),
        }
    }
}

impl DatabusConfig {
    /// Create a configuration for the given socket paths
    pub fn new(listen_path: impl Into<PathBuf>, relay_path: impl Into<PathBuf>) -> Self {
        Self {
            listen_path: listen_path.into(),
            relay_path: relay_path.into(),
            ..Default::default()
        }
    }

    /// Announce this peer to a multicast endpoint on connect
    pub fn with_announce(mut self, announce_path: impl Into<PathBuf>) -> Self {
        self.announce_path = Some(announce_path.into());
        self
    }

    /// Set the reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the queue bound and overflow strategy
    pub fn with_queue_limit(mut self, limit: usize, overflow: OverflowStrategy) -> Self {
        self.queue_limit = limit;
        self.overflow = overflow;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be > 0".to_string());
        }
        if self.queue_limit < self.batch_size {
            return Err(format!(
                "queue_limit ({}) must be >= batch_size ({})",
                self.queue_limit, self.batch_size
            ));
        }
        if self.recv_buffer_size == 0 {
            return Err("recv_buffer_size must be > 0".to_string());
        }
        if self.command_buffer == 0 {
            return Err("command_buffer must be > 0".to_string());
        }
        if self.listen_path == self.relay_path {
            return Err("listen_path and relay_path must differ".to_string());
        }
        Ok(())
    }
}

/// Databus counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabusStats {
    /// Current connection state
    pub state: ConnectionState,
    /// Messages waiting in the outbound queue
    pub queued: usize,
    /// Attached consumers
    pub consumers: usize,
    /// Messages accepted for sending
    pub messages_queued: u64,
    /// Messages handed to the transport
    pub messages_sent: u64,
    /// Messages dropped because the queue was full
    pub messages_dropped: u64,
    /// Packets handed to the transport
    pub batches_sent: u64,
    /// Failed packet sends
    pub send_failures: u64,
    /// Inbound frames decoded
    pub frames_decoded: u64,
    /// Inbound frames dropped as undecodable
    pub frames_dropped: u64,
    /// Consumer callbacks made
    pub deliveries: u64,
    /// Connection attempts
    pub connect_attempts: u64,
    /// Connections lost or refused
    pub disconnects: u64,
}

/// Databus core
///
/// Holds no sockets of its own beyond the transport it is handed. While
/// disconnected, outbound messages wait in a bounded FIFO queue that is
/// flushed in batches once a transport is established.
pub struct Databus<T: Transport = Relay> {
    config: DatabusConfig,
    state: ConnectionState,
    transport: Option<T>,
    queue: VecDeque<Message>,
    consumers: HashMap<String, Weak<dyn Consumer>>,
    reassembler: FrameReassembler,
    stats: DatabusStats,
}

impl<T: Transport> Databus<T> {
    /// Create a disconnected databus
    pub fn new(config: DatabusConfig) -> Self {
        let reassembler = FrameReassembler::new(WireCodec::with_config(config.codec.clone()));
        Self {
            config,
            state: ConnectionState::Disconnected,
            transport: None,
            queue: VecDeque::new(),
            consumers: HashMap::new(),
            reassembler,
            stats: DatabusStats::default(),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &DatabusConfig {
        &self.config
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while a transport is live
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Messages waiting to be sent
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Attached consumers, including ones not yet pruned
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> DatabusStats {
        DatabusStats {
            state: self.state,
            queued: self.queue.len(),
            consumers: self.consumers.len(),
            ..self.stats.clone()
        }
    }

    /// Attach `consumer` under `id`, replacing any consumer with that id
    pub fn attach<C: Consumer + 'static>(&mut self, id: impl Into<String>, consumer: &Arc<C>) {
        let weak = Arc::downgrade(consumer);
        let weak: Weak<dyn Consumer> = weak;
        self.attach_weak(id.into(), weak);
    }

    /// Attach an already downgraded consumer
    pub fn attach_weak(&mut self, id: String, consumer: Weak<dyn Consumer>) {
        debug!(consumer = %id, "Attaching consumer");
        if self.consumers.insert(id, consumer).is_some() {
            debug!("Replaced existing consumer registration");
        }
    }

    /// Detach the consumer registered under `id`
    ///
    /// Returns false if nothing was registered.
    pub fn detach(&mut self, id: &str) -> bool {
        let removed = self.consumers.remove(id).is_some();
        debug!(consumer = %id, removed, "Detaching consumer");
        removed
    }

    /// Mark a connection attempt as started
    pub fn set_connecting(&mut self) {
        self.stats.connect_attempts += 1;
        self.state = ConnectionState::Connecting;
    }

    /// Install a live transport and flush the queue through it
    ///
    /// Returns the number of messages flushed.
    pub fn connection_established(&mut self, transport: T) -> usize {
        self.transport = Some(transport);
        self.state = ConnectionState::Connected;
        info!(queued = self.queue.len(), "Databus connected");
        self.flush()
    }

    /// Drop the transport and fall back to queueing
    ///
    /// Returns how long to wait before reconnecting. Queued messages are
    /// kept.
    pub fn connection_lost(&mut self, reason: &dyn fmt::Display) -> Duration {
        let was_connected = self.transport.take().is_some();
        self.state = ConnectionState::Disconnected;
        self.stats.disconnects += 1;

        let delay = self.config.reconnect_delay;
        if was_connected {
            warn!(reason = %reason, queued = self.queue.len(), "Databus connection lost, reconnecting in {:?}", delay);
        } else {
            warn!(reason = %reason, "Databus connection failed, retrying in {:?}", delay);
        }
        delay
    }

    /// Drop the transport without scheduling anything
    pub fn close(&mut self) {
        self.transport = None;
        self.state = ConnectionState::Disconnected;
        if !self.queue.is_empty() {
            warn!(discarded = self.queue.len(), "Databus closed with unsent messages");
        }
    }

    /// Queue `messages` and send as much of the queue as the transport takes
    ///
    /// Returns the number of messages sent by this call.
    pub fn broadcast_send(&mut self, messages: impl IntoIterator<Item = Message>) -> usize {
        self.enqueue(messages);
        self.flush()
    }

    /// Decode one inbound datagram and deliver its messages
    ///
    /// Every live consumer receives the full list of messages. Returns the
    /// number of consumers called.
    pub fn on_frame_received(&mut self, chunk: &[u8]) -> usize {
        let decoded = self.reassembler.decode(chunk);
        self.stats.frames_decoded += decoded.stats.frames_decoded;
        self.stats.frames_dropped += decoded.stats.frames_dropped;

        if decoded.messages.is_empty() {
            return 0;
        }

        let messages = decoded.messages;
        let mut delivered = 0;
        self.consumers.retain(|id, weak| match weak.upgrade() {
            Some(consumer) => {
                consumer.on_broadcast(&messages);
                delivered += 1;
                true
            },
            None => {
                debug!(consumer = %id, "Pruning dropped consumer");
                false
            },
        });

        self.stats.deliveries += delivered as u64;
        delivered
    }

    fn enqueue(&mut self, messages: impl IntoIterator<Item = Message>) {
        let mut dropped = 0u64;
        for message in messages {
            if self.queue.len() >= self.config.queue_limit {
                match self.config.overflow {
                    OverflowStrategy::DropOldest => {
                        self.queue.pop_front();
                    },
                    OverflowStrategy::DropNewest => {
                        dropped += 1;
                        continue;
                    },
                }
                dropped += 1;
            }
            self.queue.push_back(message);
            self.stats.messages_queued += 1;
        }

        if dropped > 0 {
            self.stats.messages_dropped += dropped;
            warn!(
                dropped,
                queue_limit = self.config.queue_limit,
                strategy = ?self.config.overflow,
                "Outbound queue full, dropping messages"
            );
        }
    }

    /// Send queued messages in batches until the queue empties or a send fails
    fn flush(&mut self) -> usize {
        let mut sent = 0;

        while !self.queue.is_empty() {
            let Some(transport) = self.transport.as_ref() else {
                break;
            };

            let count = self.queue.len().min(self.config.batch_size);
            let batch: Vec<Message> = self.queue.drain(..count).collect();
            let packet = render_batch(&batch);

            match transport.send(&packet) {
                Ok(()) => {
                    sent += count;
                    self.stats.messages_sent += count as u64;
                    self.stats.batches_sent += 1;
                },
                Err(e) => {
                    // Put the batch back ahead of anything queued after it
                    for message in batch.into_iter().rev() {
                        self.queue.push_front(message);
                    }
                    self.stats.send_failures += 1;

                    if e.is_transient() {
                        debug!(error = %e, queued = self.queue.len(), "Send deferred");
                    } else {
                        self.connection_lost(&e);
                    }
                    break;
                },
            }
        }

        if sent > 0 {
            debug!(sent, queued = self.queue.len(), "Flushed outbound queue");
        }
        sent
    }
}
