//! Auction service handle

use std::sync::Arc;

use rbay_lock::LockManager;
use rbay_store::{KvStore, ProcedureRunner};

/// Entry point for item, bid and view operations against one store
#[derive(Clone)]
pub struct AuctionService {
    store: Arc<dyn KvStore>,
    locks: LockManager,
    runner: ProcedureRunner,
}

impl AuctionService {
    /// `locks` must coordinate through the same store as `store`.
    pub fn new(store: Arc<dyn KvStore>, locks: LockManager) -> Self {
        Self {
            runner: ProcedureRunner::new(store.clone()),
            store,
            locks,
        }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub(crate) fn runner(&self) -> &ProcedureRunner {
        &self.runner
    }
}
