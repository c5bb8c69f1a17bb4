//! Redis storage backend
//!
//! Each day row is a Redis hash named by the row key. Hash fields are
//! `"{field}:{slot}"` columns holding the scalar value.
//!
//! Consistency levels above `One` are enforced with `WAIT`, which blocks
//! until the requested number of replicas acknowledged the write or the
//! timeout elapses.

use super::address::RowKey;
use super::backend::{RowData, StorageBackend};
use super::slot::Slot;
use super::ConsistencyLevel;
use crate::error::StorageError;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Redis backend configuration
#[derive(Debug, Clone)]
pub struct RedisBackendConfig {
    /// Redis connection URL
    /// Default: redis://127.0.0.1:6379
    pub url: String,

    /// Number of replicas behind the primary, used to size `WAIT`
    /// Default: 0
    pub replicas: usize,

    /// Maximum time `WAIT` blocks for acknowledgements
    /// Default: 100ms
    pub wait_timeout: Duration,

    /// Connection establishment timeout
    /// Default: 5 seconds
    pub connection_timeout: Duration,
}

impl Default for RedisBackendConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            replicas: 0,
            wait_timeout: Duration::from_millis(100),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisBackendConfig {
    /// Create a new config with the specified URL
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the replica count
    pub fn replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }

    /// Set the `WAIT` timeout
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

fn column_name(field: &str, slot: Slot) -> String {
    format!("{}:{}", field, slot)
}

fn split_column(column: &str) -> Option<(&str, Slot)> {
    let (field, slot) = column.rsplit_once(':')?;
    Some((field, slot.parse().ok()?))
}

/// Day-row store on a Redis server
pub struct RedisBackend {
    /// Multiplexed connection; clones share one socket
    conn: MultiplexedConnection,
    config: RedisBackendConfig,
}

impl RedisBackend {
    /// Connect to Redis
    pub async fn connect(config: RedisBackendConfig) -> Result<Self, StorageError> {
        let client = Client::open(config.url.as_str())?;
        let conn = tokio::time::timeout(
            config.connection_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| StorageError::Backend("Redis connection timeout".to_string()))??;

        debug!(replicas = config.replicas, "Redis storage backend connected");
        Ok(Self { conn, config })
    }
}

#[async_trait]
impl StorageBackend for RedisBackend {
    fn backend_id(&self) -> &str {
        "redis"
    }

    async fn insert(
        &self,
        row: &RowKey,
        field: &str,
        slot: Slot,
        value: f64,
        consistency: ConsistencyLevel,
    ) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();

        redis::cmd("HSET")
            .arg(row.to_string())
            .arg(column_name(field, slot))
            .arg(value)
            .query_async::<i64>(&mut conn)
            .await?;

        let required = consistency.required_acks(self.config.replicas);
        if required > 0 {
            let acknowledged = redis::cmd("WAIT")
                .arg(required)
                .arg(self.config.wait_timeout.as_millis() as u64)
                .query_async::<i64>(&mut conn)
                .await?
                .max(0) as usize;

            if acknowledged < required {
                return Err(StorageError::ConsistencyNotMet {
                    required,
                    acknowledged,
                });
            }
        }

        Ok(())
    }

    async fn fetch_row(&self, row: &RowKey) -> Result<RowData, StorageError> {
        let mut conn = self.conn.clone();
        let raw = redis::cmd("HGETALL")
            .arg(row.to_string())
            .query_async::<HashMap<String, String>>(&mut conn)
            .await?;

        let mut data = RowData::new();
        for (column, value) in raw {
            match (split_column(&column), value.parse::<f64>()) {
                (Some((field, slot)), Ok(value)) => {
                    data.entry(field.to_string())
                        .or_default()
                        .insert(slot, value);
                },
                _ => warn!(row = %row, column = %column, "Skipping malformed column"),
            }
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_names() {
        let slot = Slot::new(42).unwrap();
        assert_eq!(column_name("load", slot), "load:42");
        assert_eq!(split_column("load:42"), Some(("load", slot)));
        assert_eq!(split_column("load"), None);
        assert_eq!(split_column("load:1440"), None);
    }

    #[test]
    fn test_config_builder() {
        let config = RedisBackendConfig::with_url("redis://db:6379")
            .replicas(2)
            .wait_timeout(Duration::from_millis(250));
        assert_eq!(config.url, "redis://db:6379");
        assert_eq!(config.replicas, 2);
        assert_eq!(config.wait_timeout, Duration::from_millis(250));
    }
}
