//! Lock Manager
//!
//! Provides:
//! - Single-attempt acquisition with a random per-attempt token
//! - Bounded retry with a fixed pause between attempts
//! - Token-checked release through the compare-and-delete procedure
//! - Scoped acquisition that always releases, whatever the critical section does

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use futures::FutureExt;
use metrics::counter;
use rbay_common::{RbayError, Result, gen_token, keys};
use rbay_store::{KvStore, ProcedureRunner};
use tracing::{debug, error, warn};

use crate::guard::LeaseGuard;
use crate::model::{LockConfig, LockStats, LockToken};

#[derive(Default)]
struct LockStatsCollector {
    total_acquisitions: AtomicU64,
    acquisition_timeouts: AtomicU64,
    contended_attempts: AtomicU64,
    total_releases: AtomicU64,
    stale_releases: AtomicU64,
    lease_expirations: AtomicU64,
    total_hold_time_ms: AtomicU64,
    completed_holds: AtomicU64,
}

/// Serializes writers on a resource through a lock record in the shared store
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn KvStore>,
    runner: ProcedureRunner,
    config: LockConfig,
    stats: Arc<LockStatsCollector>,
}

impl LockManager {
    pub fn new(store: Arc<dyn KvStore>, config: LockConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            runner: ProcedureRunner::new(store.clone()),
            store,
            config,
            stats: Arc::new(LockStatsCollector::default()),
        })
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Make one attempt at taking the lock on `resource`.
    ///
    /// Returns `None` when another holder owns it.
    pub async fn try_acquire(&self, resource: &str) -> Result<Option<LockToken>> {
        let key = keys::lock_key(resource);
        let token = gen_token();
        let acquired_at = Instant::now();

        if !self.store.set_nx_px(&key, &token, self.config.ttl).await? {
            return Ok(None);
        }

        self.stats
            .total_acquisitions
            .fetch_add(1, Ordering::Relaxed);
        counter!("lock_acquisitions_total").increment(1);

        Ok(Some(LockToken {
            resource: resource.to_string(),
            key,
            token,
            acquired_at,
        }))
    }

    /// Delete the lock record if it still carries this acquisition's token.
    ///
    /// Returns `false` when the record is gone or owned by someone else;
    /// that case is not an error and may be repeated safely.
    pub async fn release(&self, lock: &LockToken) -> Result<bool> {
        let released = self
            .runner
            .compare_and_delete(&lock.key, &lock.token)
            .await?;

        let hold_time = lock.acquired_at.elapsed().as_millis() as u64;
        self.stats
            .total_hold_time_ms
            .fetch_add(hold_time, Ordering::Relaxed);
        self.stats.completed_holds.fetch_add(1, Ordering::Relaxed);

        if released {
            self.stats.total_releases.fetch_add(1, Ordering::Relaxed);
            counter!("lock_releases_total").increment(1);
            debug!("Released lock on {} after {}ms", lock.resource, hold_time);
        } else {
            self.stats.stale_releases.fetch_add(1, Ordering::Relaxed);
            counter!("lock_stale_releases_total").increment(1);
            warn!(
                "Lock on {} was already expired or reclaimed at release ({}ms held)",
                lock.resource, hold_time
            );
        }

        Ok(released)
    }

    /// Run `critical_section` while holding the lock on `resource`.
    ///
    /// The lock is attempted up to `max_attempts` times, pausing
    /// `retry_delay` between attempts; if every attempt finds it held the
    /// call fails with `LockAcquisitionTimeout` and the critical section is
    /// not run. Store failures while acquiring are returned as-is.
    ///
    /// The critical section receives a [`LeaseGuard`] that must be used for
    /// every store operation. Release runs after the critical section
    /// returns, fails or panics, and the critical section's outcome is
    /// handed back unchanged.
    pub async fn acquire<F, Fut, T>(&self, resource: &str, critical_section: F) -> Result<T>
    where
        F: FnOnce(LeaseGuard) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let lock = self.acquire_with_retry(resource).await?;
        let guard = LeaseGuard::new(
            self.store.clone(),
            resource,
            lock.acquired_at,
            self.config.lease,
        );

        let outcome = AssertUnwindSafe(async move { critical_section(guard).await })
            .catch_unwind()
            .await;

        if let Err(e) = self.release(&lock).await {
            // The record still expires through its ttl
            error!("Failed to release lock on {}: {}", resource, e);
        }

        match outcome {
            Ok(result) => {
                if let Err(RbayError::LeaseExpired(_)) = &result {
                    self.stats.lease_expirations.fetch_add(1, Ordering::Relaxed);
                    counter!("lock_lease_expirations_total").increment(1);
                }
                result
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn acquire_with_retry(&self, resource: &str) -> Result<LockToken> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if let Some(lock) = self.try_acquire(resource).await? {
                debug!("Acquired lock on {} after {} attempt(s)", resource, attempt);
                return Ok(lock);
            }

            self.stats
                .contended_attempts
                .fetch_add(1, Ordering::Relaxed);

            if attempt >= self.config.max_attempts {
                self.stats
                    .acquisition_timeouts
                    .fetch_add(1, Ordering::Relaxed);
                counter!("lock_acquisition_timeouts_total").increment(1);
                warn!(
                    "Gave up acquiring lock on {} after {} attempts",
                    resource, attempt
                );
                return Err(RbayError::LockAcquisitionTimeout {
                    resource: resource.to_string(),
                    attempts: attempt,
                });
            }

            tokio::time::sleep(self.config.retry_delay).await;
        }
    }

    pub fn stats(&self) -> LockStats {
        let completed = self.stats.completed_holds.load(Ordering::Relaxed);
        let total_hold = self.stats.total_hold_time_ms.load(Ordering::Relaxed);
        let avg_hold = if completed > 0 {
            total_hold / completed
        } else {
            0
        };

        LockStats {
            total_acquisitions: self.stats.total_acquisitions.load(Ordering::Relaxed),
            acquisition_timeouts: self.stats.acquisition_timeouts.load(Ordering::Relaxed),
            contended_attempts: self.stats.contended_attempts.load(Ordering::Relaxed),
            total_releases: self.stats.total_releases.load(Ordering::Relaxed),
            stale_releases: self.stats.stale_releases.load(Ordering::Relaxed),
            lease_expirations: self.stats.lease_expirations.load(Ordering::Relaxed),
            avg_hold_time_ms: avg_hold,
        }
    }
}
