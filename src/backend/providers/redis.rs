//! Redis key-value backend
//!
//! Uses `redis::aio::ConnectionManager` for async multiplexed connections
//! with automatic reconnection. Requires the `backend-redis` feature flag.
//!
//! Atomicity comes from single Redis commands: `INCR` for counters and
//! `SET key value NX EX ttl` for the lock primitive.

use crate::backend::errors::{BackendError, BackendResult};
use crate::backend::traits::{ttl_seconds, KeyValueBackend};
use crate::config::{redact_url, BackendConfig};
use std::time::Duration;
use tracing::debug;

/// Keys requested per `SCAN` round trip
const SCAN_BATCH: usize = 100;

/// Redis-backed store using ConnectionManager
#[derive(Clone)]
pub struct RedisBackend {
    connection_manager: redis::aio::ConnectionManager,
    command_timeout: Duration,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("connection_manager", &"ConnectionManager")
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl RedisBackend {
    /// Connect using the backend section of the configuration
    pub async fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        let url = config.url.as_deref().ok_or_else(|| {
            BackendError::ConnectionError("no Redis URL configured".to_string())
        })?;
        Self::connect(url, config.connect_timeout(), config.command_timeout()).await
    }

    /// Connect to `url`, failing if the first connection takes longer than
    /// `connect_timeout`
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> BackendResult<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            BackendError::ConnectionError(format!("Failed to create Redis client: {}", e))
        })?;

        let connection_manager =
            tokio::time::timeout(connect_timeout, redis::aio::ConnectionManager::new(client))
                .await
                .map_err(|_| {
                    BackendError::Timeout(format!(
                        "Redis connect exceeded {}ms",
                        connect_timeout.as_millis()
                    ))
                })?
                .map_err(|e| {
                    BackendError::ConnectionError(format!("Failed to connect to Redis: {}", e))
                })?;

        debug!(url = %redact_url(url), "Redis backend connected");

        Ok(Self {
            connection_manager,
            command_timeout,
        })
    }

    /// Run one command with the configured timeout, tagging errors with the
    /// command name
    async fn query<T: redis::FromRedisValue>(
        &self,
        name: &'static str,
        cmd: redis::Cmd,
    ) -> BackendResult<T> {
        let mut conn = self.connection_manager.clone();
        tokio::time::timeout(self.command_timeout, cmd.query_async::<T>(&mut conn))
            .await
            .map_err(|_| {
                BackendError::Timeout(format!(
                    "Redis {} exceeded {}ms",
                    name,
                    self.command_timeout.as_millis()
                ))
            })?
            .map_err(|e| classify_redis_error(name, e))
    }
}

impl KeyValueBackend for RedisBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query("GET", cmd).await
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> BackendResult<()> {
        let ttl_seconds = ttl_seconds(ttl)?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("EX").arg(ttl_seconds);
        self.query::<()>("SET", cmd).await?;

        debug!(key = key, ttl_seconds = ttl_seconds, "Redis SET EX");
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> BackendResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        self.query("DEL", cmd).await
    }

    async fn scan_prefix(&self, prefix: &str) -> BackendResult<Vec<String>> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut found = Vec::new();
        let mut cursor: u64 = 0;

        // SCAN iterates without blocking the server (never KEYS)
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next_cursor, keys): (u64, Vec<String>) = self.query("SCAN", cmd).await?;

            found.extend(keys);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once
        found.sort_unstable();
        found.dedup();

        debug!(prefix = prefix, matched = found.len(), "Redis SCAN");
        Ok(found)
    }

    async fn increment(&self, key: &str) -> BackendResult<i64> {
        let mut cmd = redis::cmd("INCR");
        cmd.arg(key);
        self.query("INCR", cmd).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> BackendResult<bool> {
        let ttl_seconds = ttl_seconds(ttl)?;
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(ttl_seconds);
        let updated: i64 = self.query("EXPIRE", cmd).await?;
        Ok(updated == 1)
    }

    async fn set_if_absent_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> BackendResult<bool> {
        let ttl_seconds = ttl_seconds(ttl)?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds);
        // "OK" when written, nil when the key already exists
        let reply: Option<String> = self.query("SET NX", cmd).await?;
        Ok(reply.is_some())
    }

    async fn health_check(&self) -> BackendResult<bool> {
        let pong: String = self.query("PING", redis::cmd("PING")).await?;
        Ok(pong == "PONG")
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }

    fn is_distributed(&self) -> bool {
        true
    }
}

fn classify_redis_error(command: &str, error: redis::RedisError) -> BackendError {
    if error.is_timeout() {
        BackendError::Timeout(format!("Redis {} timed out: {}", command, error))
    } else if error.is_io_error() || error.is_connection_dropped() || error.is_connection_refusal()
    {
        BackendError::ConnectionError(format!("Redis {} failed: {}", command, error))
    } else if error.kind() == redis::ErrorKind::TypeError
        || error.kind() == redis::ErrorKind::ResponseError
    {
        BackendError::InvalidValue(format!("Redis {} rejected value: {}", command, error))
    } else {
        BackendError::CommandError(format!("Redis {} failed: {}", command, error))
    }
}

/// Escape glob metacharacters so `SCAN MATCH` treats the prefix literally
pub(crate) fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
