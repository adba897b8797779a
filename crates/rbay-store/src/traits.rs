//! Store capability interface
//!
//! The lock manager and the auction services only ever talk to the shared
//! store through this trait, so any backend offering these primitives can
//! host them.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rbay_common::Result;

use crate::procedure::Procedure;

/// Keyed storage primitives required from the shared store
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a string value, optionally expiring after `expiry`.
    async fn set(&self, key: &str, value: &str, expiry: Option<Duration>) -> Result<()>;

    /// Set `key` only if it is absent, expiring after `ttl`.
    ///
    /// Returns whether the value was written.
    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Delete a key, returns whether it existed.
    async fn del(&self, key: &str) -> Result<bool>;

    /// Read every field of a hash. A missing key yields an empty map.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()>;

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>>;

    /// Members with scores by rank, ascending unless `rev`. Negative indices
    /// count from the end.
    async fn zrange(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        rev: bool,
    ) -> Result<Vec<(String, f64)>>;

    /// Members whose score lies in `[min, max]`, ascending, paged by
    /// `offset`/`count`.
    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>>;

    /// Append to a list, returns the new length.
    async fn rpush(&self, key: &str, value: &str) -> Result<u64>;

    /// Slice a list by inclusive indices; negative indices count from the end.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;

    /// Add a set member, returns whether it was newly added.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;

    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    /// Run a registered procedure indivisibly over `keys` and `args`.
    async fn eval(
        &self,
        procedure: &Procedure,
        keys: &[String],
        args: &[String],
    ) -> Result<Option<i64>>;
}
