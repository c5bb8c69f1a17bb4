//! Databus service task
//!
//! Owns the listener socket and the [`Databus`], and serializes every
//! operation through one task. Callers talk to it through a cloneable
//! [`DatabusHandle`].

use std::io;
use std::sync::{Arc, Weak};

use tokio::net::UnixDatagram;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use super::databus::{Databus, DatabusConfig, DatabusStats};
use super::relay::Relay;
use super::Consumer;
use crate::error::TransportError;
use crate::resilience::{log_errors, suppress, suppress_if};
use crate::types::Message;

/// Requests handled by the service task
enum Command {
    Attach {
        id: String,
        consumer: Weak<dyn Consumer>,
    },
    Detach {
        id: String,
    },
    Broadcast(Vec<Message>),
    Stats(oneshot::Sender<DatabusStats>),
}

/// Cloneable handle to a running [`DatabusService`]
#[derive(Clone)]
pub struct DatabusHandle {
    tx: mpsc::Sender<Command>,
}

impl DatabusHandle {
    /// Attach `consumer` under `id`, replacing any consumer with that id
    pub async fn attach<C: Consumer + 'static>(
        &self,
        id: impl Into<String>,
        consumer: &Arc<C>,
    ) -> Result<(), TransportError> {
        let consumer = Arc::downgrade(consumer);
        let consumer: Weak<dyn Consumer> = consumer;
        self.send(Command::Attach {
            id: id.into(),
            consumer,
        })
        .await
    }

    /// Detach the consumer registered under `id`
    pub async fn detach(&self, id: impl Into<String>) -> Result<(), TransportError> {
        self.send(Command::Detach { id: id.into() }).await
    }

    /// Queue `messages` for broadcast
    pub async fn broadcast(&self, messages: Vec<Message>) -> Result<(), TransportError> {
        self.send(Command::Broadcast(messages)).await
    }

    /// Fetch a snapshot of the databus counters
    pub async fn stats(&self) -> Result<DatabusStats, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats(reply)).await?;
        rx.await.map_err(|_| TransportError::ServiceStopped)
    }

    async fn send(&self, command: Command) -> Result<(), TransportError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| TransportError::ServiceStopped)
    }
}

/// Databus peer bound to a listen socket and a relay endpoint
pub struct DatabusService {
    config: DatabusConfig,
    databus: Databus<Relay>,
    listener: Option<UnixDatagram>,
    commands: mpsc::Receiver<Command>,
}

impl DatabusService {
    /// Create the service and a handle to it
    ///
    /// Nothing is bound until [`run`](Self::run) starts.
    pub fn new(config: DatabusConfig) -> (Self, DatabusHandle) {
        let (tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let service = Self {
            databus: Databus::new(config.clone()),
            config,
            listener: None,
            commands,
        };
        (service, DatabusHandle { tx })
    }

    /// Run until `shutdown_rx` fires or every handle is dropped
    ///
    /// Connection failures never end the loop; the service keeps queueing
    /// and reconnects after the configured delay.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            listen = %self.config.listen_path.display(),
            relay = %self.config.relay_path.display(),
            "Starting databus"
        );

        let mut buffer = vec![0u8; self.config.recv_buffer_size];
        let mut reconnect_at: Option<Instant> = None;

        loop {
            if self.listener.is_none() && reconnect_at.map_or(true, |at| Instant::now() >= at) {
                reconnect_at = match self.connect() {
                    Ok(()) => None,
                    Err(e) => Some(Instant::now() + self.databus.connection_lost(&e)),
                };
            }

            // A fatal send or receive error drops the transport inside the databus
            if self.listener.is_some() && !self.databus.is_connected() {
                self.listener = None;
                reconnect_at = Some(Instant::now() + self.config.reconnect_delay);
            }

            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!("Databus received shutdown signal");
                    break;
                }

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("All databus handles dropped, stopping");
                        break;
                    },
                },

                result = recv_datagram(self.listener.as_ref(), &mut buffer) => match result {
                    Ok(len) => {
                        self.databus.on_frame_received(&buffer[..len]);
                    },
                    Err(e) => {
                        self.databus.connection_lost(&e);
                    },
                },

                _ = sleep_until(reconnect_at) => {}
            }
        }

        self.teardown();
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        self.databus.set_connecting();

        let path = &self.config.listen_path;
        suppress_if(
            |e: &io::Error| e.kind() == io::ErrorKind::NotFound,
            (),
            || std::fs::remove_file(path),
        )?;
        let listener = UnixDatagram::bind(path)?;
        let relay = Relay::connect(&self.config.relay_path)?;

        // Announcing is best-effort; the relay link works without it
        if let Some(announce_path) = &self.config.announce_path {
            log_errors("announce", || Relay::connect(announce_path)?.announce(path));
        }

        self.listener = Some(listener);
        self.databus.connection_established(relay);
        Ok(())
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Attach { id, consumer } => self.databus.attach_weak(id, consumer),
            Command::Detach { id } => {
                self.databus.detach(&id);
            },
            Command::Broadcast(messages) => {
                self.databus.broadcast_send(messages);
            },
            Command::Stats(reply) => {
                let _ = reply.send(self.databus.stats());
            },
        }
    }

    fn teardown(&mut self) {
        let stats = self.databus.stats();
        self.databus.close();

        if self.listener.take().is_some() {
            if let Err(e) = std::fs::remove_file(&self.config.listen_path) {
                debug!(error = %e, "Failed to remove listen socket");
            }
        }

        info!(
            messages_sent = stats.messages_sent,
            messages_dropped = stats.messages_dropped,
            frames_decoded = stats.frames_decoded,
            frames_dropped = stats.frames_dropped,
            disconnects = stats.disconnects,
            "Databus stopped"
        );
    }
}

async fn recv_datagram(socket: Option<&UnixDatagram>, buf: &mut [u8]) -> io::Result<usize> {
    match socket {
        Some(socket) => socket.recv(buf).await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Drop for DatabusService {
    fn drop(&mut self) {
        // Task aborted mid-run
        if self.listener.take().is_some() {
            suppress(|| std::fs::remove_file(&self.config.listen_path));
        }
    }
}
