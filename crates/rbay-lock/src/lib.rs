//! rbay Lock - lease-based distributed mutual exclusion
//!
//! This crate provides:
//! - Lock configuration and data model
//! - The lock manager (acquire with bounded retry, token-checked release)
//! - The lease-bound store guard handed to critical sections

mod guard;
mod manager;
mod model;

pub use guard::LeaseGuard;
pub use manager::LockManager;
pub use model::*;

use metrics::describe_counter;

/// Register descriptions for the lock metrics.
/// Should be called once at application startup
pub fn describe_metrics() {
    describe_counter!("lock_acquisitions_total", "Total number of lock acquisitions");
    describe_counter!(
        "lock_acquisition_timeouts_total",
        "Total number of acquisitions that exhausted every attempt"
    );
    describe_counter!(
        "lock_releases_total",
        "Total number of releases that deleted the lock record"
    );
    describe_counter!(
        "lock_stale_releases_total",
        "Total number of releases whose token no longer matched"
    );
    describe_counter!(
        "lock_lease_expirations_total",
        "Total number of critical sections ended by an expired lease"
    );
}
