//! Lock Data Model

use std::time::{Duration, Instant};

use rbay_common::{RbayError, Result};
use serde::Serialize;

/// Default store-side lock TTL
pub const DEFAULT_TTL_MS: u64 = 2000;
/// Default guard-side lease window
pub const DEFAULT_LEASE_MS: u64 = 2000;
/// Default pause between acquisition attempts
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;
/// Default number of acquisition attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Lock manager configuration
///
/// `ttl` is enforced by the store, `lease` by the in-process guard. The two
/// are never cross-checked at runtime, so `lease` must not exceed `ttl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Expiry set on the lock key
    pub ttl: Duration,
    /// Window during which the guard lets operations through
    pub lease: Duration,
    /// Pause between failed acquisition attempts
    pub retry_delay: Duration,
    /// Total acquisition attempts before giving up
    pub max_attempts: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(DEFAULT_TTL_MS),
            lease: Duration::from_millis(DEFAULT_LEASE_MS),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl LockConfig {
    pub fn from_millis(ttl_ms: u64, lease_ms: u64, retry_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            ttl: Duration::from_millis(ttl_ms),
            lease: Duration::from_millis(lease_ms),
            retry_delay: Duration::from_millis(retry_delay_ms),
            max_attempts,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(RbayError::Config("lock ttl must be positive".to_string()));
        }
        if self.lease > self.ttl {
            return Err(RbayError::Config(format!(
                "lock lease ({:?}) must not exceed the lock ttl ({:?})",
                self.lease, self.ttl
            )));
        }
        if self.max_attempts == 0 {
            return Err(RbayError::Config(
                "lock max attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Upper bound on time spent waiting for a contended lock
    pub fn max_wait(&self) -> Duration {
        self.retry_delay * self.max_attempts.saturating_sub(1)
    }
}

/// Proof of one successful acquisition
#[derive(Debug, Clone)]
pub struct LockToken {
    /// Logical resource the lock protects
    pub resource: String,
    /// Store key of the lock record
    pub key: String,
    /// Random value written to the lock key
    pub token: String,
    /// Taken just before the conditional set was issued
    pub acquired_at: Instant,
}

/// Lock statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LockStats {
    /// Successful acquisitions
    pub total_acquisitions: u64,
    /// Acquisitions that exhausted every attempt
    pub acquisition_timeouts: u64,
    /// Attempts that found the lock already held
    pub contended_attempts: u64,
    /// Releases that deleted the lock record
    pub total_releases: u64,
    /// Releases whose token no longer matched
    pub stale_releases: u64,
    /// Critical sections that ended with an expired lease
    pub lease_expirations: u64,
    /// Average time between acquisition and release in milliseconds
    pub avg_hold_time_ms: u64,
}
