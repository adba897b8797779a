//! Shared fixtures for auction integration tests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rbay_auction::{AuctionService, CreateBidAttrs, CreateItemAttrs};
use rbay_common::Result;
use rbay_lock::{LockConfig, LockManager};
use rbay_store::{KvStore, MemoryStore, Procedure};

pub fn service_with(config: LockConfig) -> (Arc<MemoryStore>, AuctionService) {
    let store = Arc::new(MemoryStore::new());
    let locks = LockManager::new(store.clone(), config).expect("valid lock config");
    (store.clone(), AuctionService::new(store, locks))
}

pub fn service() -> (Arc<MemoryStore>, AuctionService) {
    service_with(LockConfig::default())
}

pub fn item_attrs(
    name: &str,
    price: f64,
    created_at: DateTime<Utc>,
    ending_at: DateTime<Utc>,
) -> CreateItemAttrs {
    CreateItemAttrs {
        name: name.to_string(),
        description: format!("{} for sale", name),
        image_url: String::new(),
        price,
        created_at,
        ending_at,
    }
}

pub async fn open_item(service: &AuctionService, price: f64) -> String {
    let now = Utc::now();
    service
        .create_item(&item_attrs("X", price, now, now + Duration::hours(1)), "seller")
        .await
        .expect("item created")
}

pub fn bid(item_id: &str, user_id: &str, amount: f64) -> CreateBidAttrs {
    CreateBidAttrs {
        item_id: item_id.to_string(),
        user_id: user_id.to_string(),
        amount,
        created_at: Utc::now(),
    }
}

/// Store that stalls item reads by a configurable delay, standing in for a
/// process that pauses mid critical section.
pub struct StallingStore {
    inner: Arc<MemoryStore>,
    item_read_delay_ms: AtomicU64,
}

impl StallingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            item_read_delay_ms: AtomicU64::new(0),
        }
    }

    pub fn stall_item_reads(&self, delay: StdDuration) {
        self.item_read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvStore for StallingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, expiry: Option<StdDuration>) -> Result<()> {
        self.inner.set(key, value, expiry).await
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl: StdDuration) -> Result<bool> {
        self.inner.set_nx_px(key, value, ttl).await
    }

    async fn del(&self, key: &str) -> Result<bool> {
        self.inner.del(key).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let delay = self.item_read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 && key.starts_with("items#") {
            tokio::time::sleep(StdDuration::from_millis(delay)).await;
        }
        self.inner.hgetall(key).await
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        self.inner.hset(key, fields).await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.inner.zadd(key, member, score).await
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.inner.zscore(key, member).await
    }

    async fn zrange(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        rev: bool,
    ) -> Result<Vec<(String, f64)>> {
        self.inner.zrange(key, start, stop, rev).await
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>> {
        self.inner
            .zrange_by_score(key, min, max, offset, count)
            .await
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64> {
        self.inner.rpush(key, value).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.inner.lrange(key, start, stop).await
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        self.inner.sadd(key, member).await
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        self.inner.sismember(key, member).await
    }

    async fn eval(
        &self,
        procedure: &Procedure,
        keys: &[String],
        args: &[String],
    ) -> Result<Option<i64>> {
        self.inner.eval(procedure, keys, args).await
    }
}
