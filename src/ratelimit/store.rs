//! Counter store backed by a Redis cluster.
//!
//! The store owns the authoritative counter arithmetic for the fleet.
//! Counters are fixed-window: the TTL is set once on the 0 to 1 transition
//! and never refreshed, so a counter expires a full window after its first
//! increment and the next increment recreates it at 1.

use async_trait::async_trait;
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::trace;

use crate::config::RedisSettings;
use crate::error::Result;
use crate::metrics;

/// Capability surface of the counter store.
///
/// Abstracting the store behind a trait lets tests substitute an in-memory
/// implementation without touching the decision engine or the batcher.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter for `key` by 1 and return the new
    /// value. The 0 to 1 transition arms the window TTL.
    async fn incr(&self, key: &str) -> Result<u64>;

    /// Increment a batch of keys in a pipeline. Per-key post-conditions match
    /// [`CounterStore::incr`]; the batch is not atomic across keys and
    /// partial success is acceptable.
    async fn pipeline_incr(&self, keys: &[String]) -> Result<()>;

    /// Liveness probe, used at startup.
    async fn ping(&self) -> Result<()>;
}

/// Counter store over an async Redis cluster connection.
pub struct RedisCounterStore {
    conn: ClusterConnection,
    window_secs: i64,
}

impl RedisCounterStore {
    /// Connect to the configured cluster endpoints.
    ///
    /// `window` is the fixed counting window applied to freshly created
    /// counters.
    pub async fn connect(settings: &RedisSettings, window: Duration) -> Result<Self> {
        // The redis crate wants URLs; configuration carries bare host:port
        // endpoints.
        let urls: Vec<String> = settings
            .cluster_addrs
            .iter()
            .map(|addr| {
                if addr.contains("://") {
                    addr.clone()
                } else {
                    format!("redis://{}", addr)
                }
            })
            .collect();

        let client = ClusterClientBuilder::new(urls)
            .connection_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .response_timeout(Duration::from_millis(settings.response_timeout_ms))
            .retries(settings.max_redirects)
            .build()?;

        let conn = client.get_async_connection().await?;

        Ok(Self {
            conn,
            window_secs: window.as_secs() as i64,
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();

        let count: u64 = conn.incr(key, 1u64).await.map_err(|e| {
            metrics::record_redis_error("incr");
            e
        })?;

        // Arm the window only when this increment created the counter.
        if count == 1 {
            let _: bool = conn.expire(key, self.window_secs).await.map_err(|e| {
                metrics::record_redis_error("expire");
                e
            })?;
        }

        trace!(key, count, "incremented counter");
        Ok(count)
    }

    async fn pipeline_incr(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("INCR").arg(key);
        }
        let counts: Vec<u64> = pipe.query_async(&mut conn).await.map_err(|e| {
            metrics::record_redis_error("pipeline_exec");
            e
        })?;

        // Keys created by this batch still need their window armed.
        let created: Vec<&String> = keys
            .iter()
            .zip(&counts)
            .filter(|(_, &count)| count == 1)
            .map(|(key, _)| key)
            .collect();

        if !created.is_empty() {
            let mut pipe = redis::pipe();
            for key in created {
                pipe.cmd("EXPIRE").arg(key).arg(self.window_secs).ignore();
            }
            let _: () = pipe.query_async(&mut conn).await.map_err(|e| {
                metrics::record_redis_error("pipeline_exec");
                e
            })?;
        }

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await.map_err(|e| {
            metrics::record_redis_error("ping");
            e
        })?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory counter store doubles for unit tests.

    use super::*;
    use redis::{ErrorKind, RedisError};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Instant;

    /// A windowed in-memory counter store matching the Redis semantics.
    pub(crate) struct MemoryCounterStore {
        counters: Mutex<HashMap<String, (u64, Instant)>>,
        window: Duration,
    }

    impl MemoryCounterStore {
        pub(crate) fn new(window: Duration) -> Self {
            Self {
                counters: Mutex::new(HashMap::new()),
                window,
            }
        }

        /// Current count for a key, 0 when absent or expired.
        pub(crate) fn count(&self, key: &str) -> u64 {
            let counters = self.counters.lock().unwrap();
            match counters.get(key) {
                Some((count, expires_at)) if Instant::now() < *expires_at => *count,
                _ => 0,
            }
        }

        fn bump(&self, key: &str) -> u64 {
            let mut counters = self.counters.lock().unwrap();
            let now = Instant::now();
            match counters.get_mut(key) {
                Some((count, expires_at)) if now < *expires_at => {
                    *count += 1;
                    *count
                }
                _ => {
                    counters.insert(key.to_string(), (1, now + self.window));
                    1
                }
            }
        }
    }

    #[async_trait]
    impl CounterStore for MemoryCounterStore {
        async fn incr(&self, key: &str) -> Result<u64> {
            Ok(self.bump(key))
        }

        async fn pipeline_incr(&self, keys: &[String]) -> Result<()> {
            for key in keys {
                self.bump(key);
            }
            Ok(())
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    /// A store whose every operation fails with a transport error.
    pub(crate) struct FailingCounterStore;

    impl FailingCounterStore {
        fn error() -> RedisError {
            RedisError::from((ErrorKind::IoError, "counter store unreachable"))
        }
    }

    #[async_trait]
    impl CounterStore for FailingCounterStore {
        async fn incr(&self, _key: &str) -> Result<u64> {
            metrics::record_redis_error("incr");
            Err(Self::error().into())
        }

        async fn pipeline_incr(&self, _keys: &[String]) -> Result<()> {
            metrics::record_redis_error("pipeline_exec");
            Err(Self::error().into())
        }

        async fn ping(&self) -> Result<()> {
            metrics::record_redis_error("ping");
            Err(Self::error().into())
        }
    }
}
