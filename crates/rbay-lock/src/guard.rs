//! Lease-bound store handle
//!
//! Every store operation a critical section performs goes through a
//! `LeaseGuard`. Once the lease window has elapsed the guard refuses all
//! operations with `LeaseExpired`, whether or not another holder has
//! already taken the lock key. Operations already in flight are not
//! interrupted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rbay_common::{RbayError, Result};
use rbay_store::{KvStore, Procedure};
use tracing::warn;

/// Store handle valid only while the lease lasts
pub struct LeaseGuard {
    store: Arc<dyn KvStore>,
    resource: String,
    started_at: Instant,
    lease: Duration,
}

impl LeaseGuard {
    pub fn new(
        store: Arc<dyn KvStore>,
        resource: impl Into<String>,
        started_at: Instant,
        lease: Duration,
    ) -> Self {
        Self {
            store,
            resource: resource.into(),
            started_at,
            lease,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn is_expired(&self) -> bool {
        self.started_at.elapsed() >= self.lease
    }

    /// Time left before the guard starts refusing operations
    pub fn remaining(&self) -> Duration {
        self.lease.saturating_sub(self.started_at.elapsed())
    }

    /// Fail with `LeaseExpired` once the lease window has elapsed.
    pub fn ensure_valid(&self) -> Result<()> {
        if self.is_expired() {
            warn!(
                "Lease on {} expired after {:?}, refusing store operation",
                self.resource, self.lease
            );
            return Err(RbayError::LeaseExpired(self.resource.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for LeaseGuard {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_valid()?;
        self.store.get(key).await
    }

    async fn set(&self, key: &str, value: &str, expiry: Option<Duration>) -> Result<()> {
        self.ensure_valid()?;
        self.store.set(key, value, expiry).await
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.ensure_valid()?;
        self.store.set_nx_px(key, value, ttl).await
    }

    async fn del(&self, key: &str) -> Result<bool> {
        self.ensure_valid()?;
        self.store.del(key).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.ensure_valid()?;
        self.store.hgetall(key).await
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        self.ensure_valid()?;
        self.store.hset(key, fields).await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.ensure_valid()?;
        self.store.zadd(key, member, score).await
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.ensure_valid()?;
        self.store.zscore(key, member).await
    }

    async fn zrange(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        rev: bool,
    ) -> Result<Vec<(String, f64)>> {
        self.ensure_valid()?;
        self.store.zrange(key, start, stop, rev).await
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>> {
        self.ensure_valid()?;
        self.store
            .zrange_by_score(key, min, max, offset, count)
            .await
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64> {
        self.ensure_valid()?;
        self.store.rpush(key, value).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.ensure_valid()?;
        self.store.lrange(key, start, stop).await
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        self.ensure_valid()?;
        self.store.sadd(key, member).await
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        self.ensure_valid()?;
        self.store.sismember(key, member).await
    }

    async fn eval(
        &self,
        procedure: &Procedure,
        keys: &[String],
        args: &[String],
    ) -> Result<Option<i64>> {
        self.ensure_valid()?;
        self.store.eval(procedure, keys, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbay_store::MemoryStore;

    #[tokio::test]
    async fn test_guard_delegates_within_lease() {
        let store = Arc::new(MemoryStore::new());
        let guard = LeaseGuard::new(
            store.clone(),
            "item-1",
            Instant::now(),
            Duration::from_secs(5),
        );

        guard.rpush("history#item-1", "10:1").await.unwrap();
        assert_eq!(
            store.lrange("history#item-1", 0, -1).await.unwrap(),
            ["10:1"]
        );
        assert!(!guard.is_expired());
        assert!(guard.remaining() > Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_guard_refuses_after_lease() {
        let store = Arc::new(MemoryStore::new());
        let guard = LeaseGuard::new(
            store.clone(),
            "item-1",
            Instant::now(),
            Duration::from_millis(20),
        );

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(guard.is_expired());
        assert_eq!(guard.remaining(), Duration::ZERO);

        let err = guard
            .hset("items#item-1", &[("price".to_string(), "99".to_string())])
            .await
            .unwrap_err();
        assert_eq!(err, RbayError::LeaseExpired("item-1".to_string()));
        assert_eq!(
            guard.get("anything").await.unwrap_err(),
            RbayError::LeaseExpired("item-1".to_string())
        );

        // Nothing reached the store
        assert!(store.hgetall("items#item-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_lease_is_expired_immediately() {
        let store = Arc::new(MemoryStore::new());
        let guard = LeaseGuard::new(store, "item-1", Instant::now(), Duration::ZERO);
        assert!(guard.ensure_valid().is_err());
    }
}
