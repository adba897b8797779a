//! Redis-backed store
//!
//! The connection is explicitly opened with [`RedisStore::connect`] and
//! closed with [`RedisStore::disconnect`]; operations issued while
//! disconnected fail with `StoreUnavailable`. Procedures run as Lua scripts
//! through `EVALSHA`, reloading the script on a cache miss.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use rbay_common::{RbayError, Result};
use redis::aio::MultiplexedConnection;
use tracing::{info, warn};

use crate::procedure::{BUILTIN_PROCEDURES, Procedure};
use crate::traits::KvStore;

fn store_error(err: redis::RedisError) -> RbayError {
    RbayError::StoreUnavailable(err.to_string())
}

/// `KvStore` over a Redis server
pub struct RedisStore {
    client: redis::Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    scripts: DashMap<&'static str, redis::Script>,
}

impl RedisStore {
    /// Create a disconnected store for `url` (`redis://[:password@]host:port[/db]`).
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| RbayError::Config(format!("invalid redis url '{}': {}", url, e)))?;

        let scripts = DashMap::new();
        for procedure in BUILTIN_PROCEDURES {
            scripts.insert(procedure.name, redis::Script::new(procedure.script));
        }

        Ok(Self {
            client,
            connection: RwLock::new(None),
            scripts,
        })
    }

    /// Register an additional procedure.
    pub fn register(&self, procedure: &Procedure) {
        self.scripts
            .insert(procedure.name, redis::Script::new(procedure.script));
    }

    pub async fn connect(&self) -> Result<()> {
        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(store_error)?;
        *self.connection.write() = Some(connection);
        info!("Connected to redis");
        Ok(())
    }

    pub fn disconnect(&self) {
        if self.connection.write().take().is_none() {
            warn!("Redis store disconnect requested while not connected");
        } else {
            info!("Disconnected from redis");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.read().is_some()
    }

    fn conn(&self) -> Result<MultiplexedConnection> {
        self.connection
            .read()
            .clone()
            .ok_or_else(|| RbayError::StoreUnavailable("redis store is not connected".to_string()))
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn()?;
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_error)
    }

    async fn set(&self, key: &str, value: &str, expiry: Option<Duration>) -> Result<()> {
        let mut conn = self.conn()?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(expiry) = expiry {
            cmd.arg("PX").arg(expiry.as_millis() as u64);
        }
        let _: () = cmd.query_async(&mut conn).await.map_err(store_error)?;
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn()?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(removed > 0)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn()?;
        redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_error)
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        let _: i64 = cmd.query_async(&mut conn).await.map_err(store_error)?;
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.conn()?;
        let _: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let mut conn = self.conn()?;
        redis::cmd("ZSCORE")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(store_error)
    }

    async fn zrange(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        rev: bool,
    ) -> Result<Vec<(String, f64)>> {
        let mut conn = self.conn()?;
        redis::cmd(if rev { "ZREVRANGE" } else { "ZRANGE" })
            .arg(key)
            .arg(start)
            .arg(stop)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await
            .map_err(store_error)
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>> {
        let mut conn = self.conn()?;
        redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(min)
            .arg(max)
            .arg("LIMIT")
            .arg(offset)
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(store_error)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64> {
        let mut conn = self.conn()?;
        redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(store_error)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let mut conn = self.conn()?;
        redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(store_error)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let added: i64 = redis::cmd("SADD")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(added > 0)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        redis::cmd("SISMEMBER")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(store_error)
    }

    async fn eval(
        &self,
        procedure: &Procedure,
        keys: &[String],
        args: &[String],
    ) -> Result<Option<i64>> {
        let script = self
            .scripts
            .get(procedure.name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RbayError::ProcedureNotFound(procedure.name.to_string()))?;

        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(arg);
        }

        let mut conn = self.conn()?;
        invocation
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)
    }
}
