//! Databus-to-storage bridge
//!
//! [`StorageSink`] is a [`Consumer`] that picks events named
//! `host|service|field` out of each broadcast and hands them to a writer
//! task. The callback never blocks the bus: when the writer falls behind,
//! events are dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::Consumer;
use crate::resilience::{log_errors_async, RetryPolicy};
use crate::storage::StorageEngine;
use crate::types::{Event, Message};

/// Split an event name into `(host, service, field)`
///
/// Returns `None` unless all three parts are present and non-empty.
pub fn split_event_name(name: &str) -> Option<(&str, &str, &str)> {
    let mut parts = name.splitn(3, '|');
    let host = parts.next().filter(|s| !s.is_empty())?;
    let service = parts.next().filter(|s| !s.is_empty())?;
    let field = parts.next().filter(|s| !s.is_empty())?;
    Some((host, service, field))
}

/// Sink counters
#[derive(Debug, Default)]
pub struct SinkStats {
    received: AtomicU64,
    skipped: AtomicU64,
    dropped: AtomicU64,
    stored: AtomicU64,
    failed: AtomicU64,
}

impl SinkStats {
    /// Get a snapshot of current statistics
    pub fn snapshot(&self) -> SinkStatsSnapshot {
        SinkStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sink statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStatsSnapshot {
    /// Messages seen in broadcasts
    pub received: u64,
    /// Data messages and events without a `host|service|field` name
    pub skipped: u64,
    /// Events dropped because the writer queue was full
    pub dropped: u64,
    /// Events written to storage
    pub stored: u64,
    /// Events that failed every write attempt
    pub failed: u64,
}

/// Consumer that persists bus events
pub struct StorageSink {
    tx: mpsc::Sender<Event>,
    stats: Arc<SinkStats>,
}

impl StorageSink {
    /// Start the writer task and return the sink feeding it
    ///
    /// The task stops when `shutdown_rx` fires or the sink is dropped,
    /// writing whatever is still queued first.
    pub fn spawn(
        engine: StorageEngine,
        retry: RetryPolicy,
        buffer: usize,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let stats = Arc::new(SinkStats::default());
        let writer = SinkWriter {
            engine,
            retry,
            stats: Arc::clone(&stats),
        };
        let task = tokio::spawn(writer.run(rx, shutdown_rx));
        (Arc::new(Self { tx, stats }), task)
    }

    /// Get a snapshot of the sink counters
    pub fn stats(&self) -> SinkStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Consumer for StorageSink {
    fn on_broadcast(&self, messages: &[Message]) {
        self.stats
            .received
            .fetch_add(messages.len() as u64, Ordering::Relaxed);

        for message in messages {
            let Some(event) = message.as_event() else {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            if split_event_name(&event.name).is_none() {
                debug!(name = %event.name, "Skipping event without host|service|field name");
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            if self.tx.try_send(event.clone()).is_err() {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(name = %event.name, "Storage writer queue full, dropping event");
            }
        }
    }
}

struct SinkWriter {
    engine: StorageEngine,
    retry: RetryPolicy,
    stats: Arc<SinkStats>,
}

impl SinkWriter {
    async fn run(self, mut rx: mpsc::Receiver<Event>, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    rx.close();
                    while let Some(event) = rx.recv().await {
                        self.write(event).await;
                    }
                    break;
                }

                event = rx.recv() => match event {
                    Some(event) => self.write(event).await,
                    None => break,
                },
            }
        }

        let stats = self.stats.snapshot();
        info!(
            stored = stats.stored,
            failed = stats.failed,
            dropped = stats.dropped,
            "Storage sink stopped"
        );
    }

    async fn write(&self, event: Event) {
        let Some((host, service, field)) = split_event_name(&event.name) else {
            return;
        };

        let stored = log_errors_async(
            "storage sink write",
            self.retry.run_async(|| {
                self.engine
                    .store(host, service, field, event.value, event.timestamp)
            }),
        )
        .await;

        match stored {
            Some(()) => self.stats.stored.fetch_add(1, Ordering::Relaxed),
            None => self.stats.failed.fetch_add(1, Ordering::Relaxed),
        };
    }
}
