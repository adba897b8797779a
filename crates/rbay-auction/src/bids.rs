//! Bid commit protocol
//!
//! A bid moves through `started -> locked -> validated -> committed`, or is
//! aborted after `locked`/`validated`. Everything after `locked` runs inside
//! the item's lock and touches the store only through the lease guard, so no
//! other writer can interleave with the read-validate-write sequence. The
//! three commit writes are issued concurrently; partial writes issued before
//! a lease expiry are not rolled back.

use chrono::Utc;
use metrics::counter;
use rbay_common::{RbayError, Result, keys};
use rbay_store::KvStore;
use tracing::debug;

use crate::items::load_item;
use crate::model::{Bid, CreateBidAttrs, FIELD_BIDS, FIELD_HIGHEST_BID_USER_ID, FIELD_PRICE};
use crate::service::AuctionService;

fn rejected(item_id: &str, err: RbayError) -> RbayError {
    let reason = match &err {
        RbayError::ItemNotFound(_) => "item_not_found",
        RbayError::BidTooLow { .. } => "bid_too_low",
        RbayError::AuctionClosed(_) => "auction_closed",
        RbayError::LeaseExpired(_) => "lease_expired",
        RbayError::LockAcquisitionTimeout { .. } => "lock_timeout",
        _ => "store_error",
    };
    counter!("bids_rejected_total", "reason" => reason).increment(1);
    debug!("Bid on {} aborted: {}", item_id, err);
    err
}

/// List indices (counted from the newest entry) covering one history page,
/// `None` when the page is necessarily empty.
fn history_window(offset: usize, count: usize) -> Option<(i64, i64)> {
    if count == 0 {
        return None;
    }
    let offset = i64::try_from(offset).ok()?;
    let count = i64::try_from(count).unwrap_or(i64::MAX);
    let stop = -1 - offset;
    let start = offset.checked_add(count).map_or(i64::MIN, |end| -end);
    Some((start, stop))
}

impl AuctionService {
    /// Place a bid, returning the recorded bid log entry.
    pub async fn create_bid(&self, attrs: CreateBidAttrs) -> Result<Bid> {
        if !attrs.amount.is_finite() || attrs.amount <= 0.0 {
            return Err(RbayError::InvalidArgument(format!(
                "invalid bid amount: {}",
                attrs.amount
            )));
        }

        debug!(
            "Bid on {} started: {} by {}",
            attrs.item_id, attrs.amount, attrs.user_id
        );
        let item_id = attrs.item_id.clone();

        let outcome = self
            .locks()
            .acquire(&item_id, |guard| async move {
                debug!("Bid on {} locked", attrs.item_id);

                let item = load_item(&guard, &attrs.item_id)
                    .await?
                    .ok_or_else(|| RbayError::ItemNotFound(attrs.item_id.clone()))?;

                if attrs.amount <= item.price {
                    return Err(RbayError::BidTooLow {
                        amount: attrs.amount,
                        price: item.price,
                    });
                }
                if item.is_closed_at(Utc::now()) {
                    return Err(RbayError::AuctionClosed(item.id));
                }
                // Checked before the first write
                guard.ensure_valid()?;
                debug!("Bid on {} validated", attrs.item_id);

                let bid = Bid {
                    amount: attrs.amount,
                    created_at: attrs.created_at,
                };
                let record = bid.encode();
                let history_key = keys::bid_history_key(&item.id);
                let item_key = keys::items_key(&item.id);
                let fields = vec![
                    (FIELD_BIDS.to_string(), (item.bids + 1).to_string()),
                    (FIELD_PRICE.to_string(), attrs.amount.to_string()),
                    (FIELD_HIGHEST_BID_USER_ID.to_string(), attrs.user_id.clone()),
                ];

                tokio::try_join!(
                    guard.rpush(&history_key, &record),
                    guard.hset(&item_key, &fields),
                    guard.zadd(keys::items_by_price_key(), &item.id, attrs.amount),
                )?;

                debug!("Bid on {} committed at {}", attrs.item_id, attrs.amount);
                Ok(bid)
            })
            .await;

        match outcome {
            Ok(bid) => {
                counter!("bids_committed_total").increment(1);
                Ok(bid)
            }
            Err(err) => Err(rejected(&item_id, err)),
        }
    }

    /// Page through an item's bids, newest first.
    ///
    /// Reads do not take the item's lock, so a page may or may not include a
    /// commit that is in flight.
    pub async fn bid_history(&self, item_id: &str, offset: usize, count: usize) -> Result<Vec<Bid>> {
        let Some((start, stop)) = history_window(offset, count) else {
            return Ok(Vec::new());
        };
        let stored = self
            .store()
            .lrange(&keys::bid_history_key(item_id), start, stop)
            .await?;

        let mut bids = stored
            .iter()
            .map(|entry| Bid::decode(entry))
            .collect::<Result<Vec<_>>>()?;
        bids.reverse();
        Ok(bids)
    }
}
