//! Shared (cross-request) cache backed by Redis.
//!
//! Every operation is wrapped in its own `tokio::time::timeout`
//! (`REDIS_TIMEOUT_GET`/`REDIS_TIMEOUT_SET`) and any failure — timeout,
//! connection drop, deserialization error — is logged at `warn!` and
//! treated as a miss or a no-op write. The resolution path must keep
//! working with Redis fully unavailable.

use std::time::Duration;

use redis::aio::ConnectionManager;
use serde_json::Value;

use gateway_core::SharedCache;

enum Backend {
    Single(ConnectionManager),
    Cluster(redis::cluster_async::ClusterConnection),
}

pub struct RedisSharedCache {
    backend: Backend,
    timeout_get: Duration,
    timeout_set: Duration,
}

impl RedisSharedCache {
    /// Connects to a single Redis node, honoring `connect_timeout`.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        timeout_get: Duration,
        timeout_set: Duration,
    ) -> redis::RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = tokio::time::timeout(connect_timeout, client.get_connection_manager())
            .await
            .map_err(|_| {
                redis::RedisError::from((redis::ErrorKind::IoError, "connection manager setup timed out"))
            })??;
        Ok(Self {
            backend: Backend::Single(manager),
            timeout_get,
            timeout_set,
        })
    }

    /// Connects to a Redis Cluster deployment.
    pub async fn connect_cluster(
        urls: &[String],
        connect_timeout: Duration,
        timeout_get: Duration,
        timeout_set: Duration,
    ) -> redis::RedisResult<Self> {
        let client = redis::cluster::ClusterClientBuilder::new(urls.to_vec()).build()?;
        let connection = tokio::time::timeout(connect_timeout, client.get_async_connection())
            .await
            .map_err(|_| {
                redis::RedisError::from((redis::ErrorKind::IoError, "cluster connection setup timed out"))
            })??;
        Ok(Self {
            backend: Backend::Cluster(connection),
            timeout_get,
            timeout_set,
        })
    }
}

#[async_trait::async_trait]
impl SharedCache for RedisSharedCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let fetch = async {
            match &self.backend {
                Backend::Single(manager) => {
                    let mut manager = manager.clone();
                    redis::cmd("GET").arg(key).query_async::<Option<String>>(&mut manager).await
                }
                Backend::Cluster(connection) => {
                    let mut connection = connection.clone();
                    redis::cmd("GET").arg(key).query_async::<Option<String>>(&mut connection).await
                }
            }
        };

        let raw = match tokio::time::timeout(self.timeout_get, fetch).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => {
                tracing::warn!(%key, error = %err, "shared cache GET failed, treating as miss");
                return None;
            }
            Err(_) => {
                tracing::warn!(%key, "shared cache GET timed out, treating as miss");
                return None;
            }
        };

        let raw = raw?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(%key, error = %err, "shared cache entry was not valid JSON, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) {
        let Ok(serialized) = serde_json::to_string(value) else {
            tracing::warn!(%key, "failed to serialize value for shared cache write");
            return;
        };
        let ttl_secs = ttl.as_secs().max(1);

        let write = async {
            match &self.backend {
                Backend::Single(manager) => {
                    let mut manager = manager.clone();
                    redis::cmd("SET")
                        .arg(key)
                        .arg(serialized)
                        .arg("EX")
                        .arg(ttl_secs)
                        .query_async::<()>(&mut manager)
                        .await
                }
                Backend::Cluster(connection) => {
                    let mut connection = connection.clone();
                    redis::cmd("SET")
                        .arg(key)
                        .arg(serialized)
                        .arg("EX")
                        .arg(ttl_secs)
                        .query_async::<()>(&mut connection)
                        .await
                }
            }
        };

        match tokio::time::timeout(self.timeout_set, write).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(%key, error = %err, "shared cache SET failed, dropping write"),
            Err(_) => tracing::warn!(%key, "shared cache SET timed out, dropping write"),
        }
    }
}
