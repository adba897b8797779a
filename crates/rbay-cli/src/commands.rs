//! Subcommands and their execution against an auction service

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use clap::{Subcommand, ValueEnum};
use rbay_auction::{AuctionService, CreateBidAttrs, CreateItemAttrs};
use rbay_common::RbayError;
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Ranking {
    Price,
    Views,
    EndingSoon,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Put an item up for auction
    CreateItem {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long = "image-url", default_value = "")]
        image_url: String,
        /// Starting price
        #[arg(long, default_value_t = 0.0)]
        price: f64,
        /// Seconds until bidding closes
        #[arg(long = "duration-secs", default_value_t = 3600)]
        duration_secs: u64,
        #[arg(long, default_value = "cli")]
        owner: String,
    },
    /// Show one item
    Item { id: String },
    /// Bid on an item
    Bid {
        item_id: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        amount: f64,
    },
    /// Record a view of an item
    View {
        item_id: String,
        #[arg(long)]
        viewer: String,
    },
    /// Page through an item's bids, newest first
    History {
        item_id: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
    /// List items by a ranking
    Ranking {
        #[arg(long, value_enum, default_value = "price")]
        by: Ranking,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
    /// Race concurrent bidders on one item and report the outcome
    Contend {
        /// Item to bid on; a fresh item is created when omitted
        #[arg(long)]
        item: Option<String>,
        #[arg(long, default_value_t = 8)]
        bidders: usize,
        /// Amount added per bidder on top of the current price
        #[arg(long, default_value_t = 1.0)]
        step: f64,
    },
}

/// `now` plus `duration_secs`, rejecting durations past the calendar's range.
fn closing_time(now: DateTime<Utc>, duration_secs: u64) -> Result<DateTime<Utc>, RbayError> {
    i64::try_from(duration_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| {
            RbayError::InvalidArgument(format!("auction duration out of range: {}s", duration_secs))
        })
}

fn to_value<T: serde::Serialize>(value: &T) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Run one command, returning its JSON output.
pub async fn execute(service: &AuctionService, command: Command) -> anyhow::Result<Value> {
    match command {
        Command::CreateItem {
            name,
            description,
            image_url,
            price,
            duration_secs,
            owner,
        } => {
            let now = Utc::now();
            let attrs = CreateItemAttrs {
                name,
                description,
                image_url,
                price,
                created_at: now,
                ending_at: closing_time(now, duration_secs)?,
            };
            let id = service.create_item(&attrs, &owner).await?;
            info!("Created item {}", id);
            Ok(json!({ "id": id }))
        }
        Command::Item { id } => {
            let item = service
                .get_item(&id)
                .await?
                .ok_or(RbayError::ItemNotFound(id))?;
            to_value(&item)
        }
        Command::Bid {
            item_id,
            user,
            amount,
        } => {
            let bid = service
                .create_bid(CreateBidAttrs {
                    item_id,
                    user_id: user,
                    amount,
                    created_at: Utc::now(),
                })
                .await?;
            to_value(&bid)
        }
        Command::View { item_id, viewer } => {
            let counted = service.increment_view(&item_id, &viewer).await?;
            Ok(json!({ "counted": counted }))
        }
        Command::History {
            item_id,
            offset,
            count,
        } => to_value(&service.bid_history(&item_id, offset, count).await?),
        Command::Ranking { by, offset, count } => {
            let items = match by {
                Ranking::Price => service.items_by_price(offset, count).await?,
                Ranking::Views => service.items_by_views(offset, count).await?,
                Ranking::EndingSoon => service.items_ending_soon(offset, count).await?,
            };
            to_value(&items)
        }
        Command::Contend {
            item,
            bidders,
            step,
        } => contend(service, item, bidders, step).await,
    }
}

async fn contend(
    service: &AuctionService,
    item: Option<String>,
    bidders: usize,
    step: f64,
) -> anyhow::Result<Value> {
    let item_id = match item {
        Some(id) => id,
        None => {
            let now = Utc::now();
            let attrs = CreateItemAttrs {
                name: "contended".to_string(),
                description: String::new(),
                image_url: String::new(),
                price: 0.0,
                created_at: now,
                ending_at: now + TimeDelta::hours(1),
            };
            service.create_item(&attrs, "cli").await?
        }
    };
    let base = service
        .get_item(&item_id)
        .await?
        .ok_or_else(|| RbayError::ItemNotFound(item_id.clone()))?
        .price;

    let mut handles = Vec::with_capacity(bidders);
    for i in 0..bidders {
        let service = service.clone();
        let attrs = CreateBidAttrs {
            item_id: item_id.clone(),
            user_id: format!("bidder-{}", i),
            amount: base + step * (i + 1) as f64,
            created_at: Utc::now(),
        };
        handles.push(tokio::spawn(async move { service.create_bid(attrs).await }));
    }

    let mut accepted = 0;
    let mut rejected: BTreeMap<&'static str, u64> = BTreeMap::new();
    for handle in handles {
        match handle.await? {
            Ok(_) => accepted += 1,
            Err(err) => *rejected.entry(err.error_code().message).or_default() += 1,
        }
    }

    let item = service.get_item(&item_id).await?;
    Ok(json!({
        "item": to_value(&item)?,
        "accepted": accepted,
        "rejected": rejected,
        "lockStats": to_value(&service.locks().stats())?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rbay_lock::{LockConfig, LockManager};
    use rbay_store::MemoryStore;

    fn service() -> AuctionService {
        let store = Arc::new(MemoryStore::new());
        let locks = LockManager::new(store.clone(), LockConfig::from_millis(2000, 2000, 1, 5000))
            .unwrap();
        AuctionService::new(store, locks)
    }

    async fn create(service: &AuctionService, price: f64) -> String {
        let out = execute(
            service,
            Command::CreateItem {
                name: "Lamp".to_string(),
                description: String::new(),
                image_url: String::new(),
                price,
                duration_secs: 3600,
                owner: "o".to_string(),
            },
        )
        .await
        .unwrap();
        out["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_bid_then_item() {
        let service = service();
        let id = create(&service, 5.0).await;

        execute(
            &service,
            Command::Bid {
                item_id: id.clone(),
                user: "alice".to_string(),
                amount: 7.0,
            },
        )
        .await
        .unwrap();

        let item = execute(&service, Command::Item { id }).await.unwrap();
        assert_eq!(item["price"], json!(7.0));
        assert_eq!(item["highestBidUserId"], json!("alice"));
    }

    #[tokio::test]
    async fn test_missing_item_surfaces_error() {
        let service = service();
        let err = execute(&service, Command::Item { id: "x".to_string() })
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<RbayError>(),
            Some(&RbayError::ItemNotFound("x".to_string()))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_contend_accepts_some_bids() {
        let service = service();
        let out = execute(
            &service,
            Command::Contend {
                item: None,
                bidders: 6,
                step: 1.0,
            },
        )
        .await
        .unwrap();

        let accepted = out["accepted"].as_u64().unwrap();
        assert!(accepted >= 1);
        assert_eq!(out["item"]["bids"], json!(accepted));
        assert_eq!(out["item"]["price"], json!(6.0));
    }

    #[tokio::test]
    async fn test_out_of_range_duration_is_rejected() {
        let service = service();
        for duration_secs in [u64::MAX, i64::MAX as u64, 400_000 * 365 * 86_400] {
            let err = execute(
                &service,
                Command::CreateItem {
                    name: "Lamp".to_string(),
                    description: String::new(),
                    image_url: String::new(),
                    price: 1.0,
                    duration_secs,
                    owner: "o".to_string(),
                },
            )
            .await
            .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<RbayError>(),
                Some(RbayError::InvalidArgument(_))
            ));
        }
        assert!(service.items_by_price(0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_price_ranking_pages_with_offset() {
        let service = service();
        let cheap = create(&service, 1.0).await;
        let dear = create(&service, 9.0).await;

        let page = |out: Value| {
            out.as_array()
                .unwrap()
                .iter()
                .map(|item| item["id"].as_str().unwrap().to_string())
                .collect::<Vec<_>>()
        };

        let first = execute(
            &service,
            Command::Ranking {
                by: Ranking::Price,
                offset: 0,
                count: 1,
            },
        )
        .await
        .unwrap();
        assert_eq!(page(first), vec![dear]);

        let second = execute(
            &service,
            Command::Ranking {
                by: Ranking::Price,
                offset: 1,
                count: 1,
            },
        )
        .await
        .unwrap();
        assert_eq!(page(second), vec![cheap]);
    }
}
