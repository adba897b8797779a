//! Distinct-viewer counting

use rbay_common::{RbayError, Result, keys};
use tracing::debug;

use crate::service::AuctionService;

impl AuctionService {
    /// Count `viewer_id` as a viewer of `item_id`.
    ///
    /// Only the first view by a given viewer bumps the item's `views` field
    /// and its entry in the view ranking. Returns whether this view counted.
    pub async fn increment_view(&self, item_id: &str, viewer_id: &str) -> Result<bool> {
        // Every created item is indexed by closing time
        if self
            .store()
            .zscore(keys::items_by_ending_at_key(), item_id)
            .await?
            .is_none()
        {
            return Err(RbayError::ItemNotFound(item_id.to_string()));
        }

        let counted = self
            .runner()
            .dedup_and_aggregate(
                &keys::items_views_key(item_id),
                &keys::items_key(item_id),
                keys::items_by_views_key(),
                item_id,
                viewer_id,
            )
            .await?;

        debug!(
            "View of {} by {} {}",
            item_id,
            viewer_id,
            if counted { "counted" } else { "already seen" }
        );
        Ok(counted)
    }
}
