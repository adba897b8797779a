//! Item reads, creation and rankings

use futures::future::try_join_all;
use rbay_common::{RbayError, Result, current_timestamp, gen_id, keys};
use rbay_store::KvStore;
use tracing::{debug, warn};

use crate::model::{CreateItemAttrs, Item};
use crate::service::AuctionService;

/// Fresh ids tried before item creation gives up
const MAX_ID_ATTEMPTS: u32 = 8;

/// Read one item through any store handle, including a lease guard.
pub async fn load_item(store: &dyn KvStore, id: &str) -> Result<Option<Item>> {
    let hash = store.hgetall(&keys::items_key(id)).await?;
    Item::from_hash(id, &hash)
}

/// Inclusive rank window for a page, `None` when the page is empty.
pub(crate) fn rank_window(offset: usize, count: usize) -> Option<(i64, i64)> {
    if count == 0 {
        return None;
    }
    let start = i64::try_from(offset).ok()?;
    let count = i64::try_from(count).unwrap_or(i64::MAX);
    Some((start, start.saturating_add(count) - 1))
}

impl AuctionService {
    pub async fn get_item(&self, id: &str) -> Result<Option<Item>> {
        load_item(self.store().as_ref(), id).await
    }

    /// Read several items concurrently; ids without an item yield `None` at
    /// their position.
    pub async fn get_items(&self, ids: &[String]) -> Result<Vec<Option<Item>>> {
        try_join_all(ids.iter().map(|id| self.get_item(id))).await
    }

    /// Create an item owned by `owner_id` and seed its rankings.
    pub async fn create_item(&self, attrs: &CreateItemAttrs, owner_id: &str) -> Result<String> {
        self.create_item_with_ids(attrs, owner_id, gen_id).await
    }

    pub(crate) async fn create_item_with_ids(
        &self,
        attrs: &CreateItemAttrs,
        owner_id: &str,
        mut next_id: impl FnMut() -> String,
    ) -> Result<String> {
        attrs.validate()?;

        let id = self.claim_item_id(&mut next_id).await?;
        let store = self.store();
        let fields = attrs.to_fields(owner_id);
        let item_key = keys::items_key(&id);
        let ending_at = attrs.ending_at.timestamp_millis() as f64;

        tokio::try_join!(
            store.hset(&item_key, &fields),
            store.zadd(keys::items_by_views_key(), &id, 0.0),
            store.zadd(keys::items_by_ending_at_key(), &id, ending_at),
            store.zadd(keys::items_by_price_key(), &id, attrs.price),
        )?;

        debug!("Created item {} owned by {}", id, owner_id);
        Ok(id)
    }

    /// Reserve an id nobody holds yet, so a new item never lands on a live one.
    async fn claim_item_id(&self, next_id: &mut impl FnMut() -> String) -> Result<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = next_id();
            if self.store().sadd(keys::item_ids_key(), &id).await? {
                return Ok(id);
            }
            warn!("Item id {} already taken, generating another", id);
        }
        Err(RbayError::InvalidData(format!(
            "no free item id after {} attempts",
            MAX_ID_ATTEMPTS
        )))
    }

    /// Most expensive items first
    pub async fn items_by_price(&self, offset: usize, count: usize) -> Result<Vec<Item>> {
        self.ranked_items(keys::items_by_price_key(), offset, count)
            .await
    }

    /// Most viewed items first
    pub async fn items_by_views(&self, offset: usize, count: usize) -> Result<Vec<Item>> {
        self.ranked_items(keys::items_by_views_key(), offset, count)
            .await
    }

    /// Items still open for bidding, soonest closing first
    pub async fn items_ending_soon(&self, offset: usize, count: usize) -> Result<Vec<Item>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let open_after = (current_timestamp() + 1) as f64;
        let ids = self
            .store()
            .zrange_by_score(
                keys::items_by_ending_at_key(),
                open_after,
                f64::INFINITY,
                offset,
                count,
            )
            .await?;
        Ok(self.get_items(&ids).await?.into_iter().flatten().collect())
    }

    async fn ranked_items(&self, ranking_key: &str, offset: usize, count: usize) -> Result<Vec<Item>> {
        let Some((start, stop)) = rank_window(offset, count) else {
            return Ok(Vec::new());
        };
        let ids: Vec<String> = self
            .store()
            .zrange(ranking_key, start, stop, true)
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        Ok(self.get_items(&ids).await?.into_iter().flatten().collect())
    }
}
