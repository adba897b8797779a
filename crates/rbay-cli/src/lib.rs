//! rbay command line driver
//!
//! Wires configuration, logging and the chosen store backend to the auction
//! core, and exposes its operations as subcommands.

pub mod commands;
pub mod config;
pub mod logging;

use std::sync::Arc;

use clap::Parser;
use rbay_auction::AuctionService;
use rbay_lock::LockManager;
use rbay_store::{KvStore, MemoryStore, RedisStore};
use tracing::info;

use crate::commands::Command;
use crate::config::{Backend, Configuration, GlobalArgs};

#[derive(Debug, Parser)]
#[command(name = "rbay", version, about = "Auction store driver")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

/// An opened store plus the handle needed to close it again
pub struct StoreHandle {
    pub store: Arc<dyn KvStore>,
    redis: Option<Arc<RedisStore>>,
}

impl StoreHandle {
    pub async fn open(configuration: &Configuration) -> anyhow::Result<Self> {
        match configuration.backend()? {
            Backend::Memory => {
                info!("Using in-process store");
                Ok(Self {
                    store: Arc::new(MemoryStore::new()),
                    redis: None,
                })
            }
            Backend::Redis => {
                let redis = Arc::new(RedisStore::new(&configuration.redis_url())?);
                redis.connect().await?;
                Ok(Self {
                    store: redis.clone(),
                    redis: Some(redis),
                })
            }
        }
    }

    pub fn close(&self) {
        if let Some(redis) = &self.redis {
            redis.disconnect();
        }
    }
}

pub fn build_service(
    configuration: &Configuration,
    store: Arc<dyn KvStore>,
) -> anyhow::Result<AuctionService> {
    let locks = LockManager::new(store.clone(), configuration.lock_config())?;
    Ok(AuctionService::new(store, locks))
}
