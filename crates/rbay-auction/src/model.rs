//! Auction data model and its store encoding

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rbay_common::{RbayError, Result, from_millis};
use serde::Serialize;

// Item hash fields
pub const FIELD_NAME: &str = "name";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_IMAGE_URL: &str = "imageUrl";
pub const FIELD_OWNER_ID: &str = "ownerId";
pub const FIELD_HIGHEST_BID_USER_ID: &str = "highestBidUserId";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_ENDING_AT: &str = "endingAt";
pub const FIELD_VIEWS: &str = "views";
pub const FIELD_LIKES: &str = "likes";
pub const FIELD_BIDS: &str = "bids";
pub const FIELD_PRICE: &str = "price";

/// An auction item with its aggregate bidding state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub owner_id: String,
    pub highest_bid_user_id: String,
    pub created_at: DateTime<Utc>,
    pub ending_at: DateTime<Utc>,
    pub views: u64,
    pub likes: u64,
    pub bids: u64,
    pub price: f64,
}

impl Item {
    /// Decode an item from its hash. An empty hash means the item does not
    /// exist and yields `None`.
    pub fn from_hash(id: &str, hash: &HashMap<String, String>) -> Result<Option<Self>> {
        if hash.is_empty() {
            return Ok(None);
        }

        let text = |field: &str| hash.get(field).cloned().unwrap_or_default();

        Ok(Some(Self {
            id: id.to_string(),
            name: text(FIELD_NAME),
            description: text(FIELD_DESCRIPTION),
            image_url: text(FIELD_IMAGE_URL),
            owner_id: text(FIELD_OWNER_ID),
            highest_bid_user_id: text(FIELD_HIGHEST_BID_USER_ID),
            created_at: timestamp_field(id, hash, FIELD_CREATED_AT)?,
            ending_at: timestamp_field(id, hash, FIELD_ENDING_AT)?,
            views: number_field(id, hash, FIELD_VIEWS)?.unwrap_or(0),
            likes: number_field(id, hash, FIELD_LIKES)?.unwrap_or(0),
            bids: number_field(id, hash, FIELD_BIDS)?.unwrap_or(0),
            price: number_field(id, hash, FIELD_PRICE)?.unwrap_or(0.0),
        }))
    }

    /// Whether bidding is over at `now`
    pub fn is_closed_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.ending_at
    }
}

fn number_field<T: std::str::FromStr>(
    id: &str,
    hash: &HashMap<String, String>,
    field: &str,
) -> Result<Option<T>> {
    hash.get(field)
        .map(|raw| {
            raw.parse::<T>().map_err(|_| {
                RbayError::InvalidData(format!("item {} has malformed {}: {}", id, field, raw))
            })
        })
        .transpose()
}

fn timestamp_field(
    id: &str,
    hash: &HashMap<String, String>,
    field: &str,
) -> Result<DateTime<Utc>> {
    let millis: i64 = number_field(id, hash, field)?
        .ok_or_else(|| RbayError::InvalidData(format!("item {} has no {}", id, field)))?;
    from_millis(millis).ok_or_else(|| {
        RbayError::InvalidData(format!("item {} has out of range {}: {}", id, field, millis))
    })
}

/// Attributes of a new item
#[derive(Debug, Clone)]
pub struct CreateItemAttrs {
    pub name: String,
    pub description: String,
    pub image_url: String,
    /// Starting price
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub ending_at: DateTime<Utc>,
}

impl CreateItemAttrs {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RbayError::InvalidArgument(
                "item name must not be empty".to_string(),
            ));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(RbayError::InvalidArgument(format!(
                "invalid starting price: {}",
                self.price
            )));
        }
        if self.ending_at <= self.created_at {
            return Err(RbayError::InvalidArgument(
                "item must close after it is created".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn to_fields(&self, owner_id: &str) -> Vec<(String, String)> {
        [
            (FIELD_NAME, self.name.clone()),
            (FIELD_DESCRIPTION, self.description.clone()),
            (FIELD_IMAGE_URL, self.image_url.clone()),
            (FIELD_OWNER_ID, owner_id.to_string()),
            (FIELD_HIGHEST_BID_USER_ID, String::new()),
            (FIELD_CREATED_AT, self.created_at.timestamp_millis().to_string()),
            (FIELD_ENDING_AT, self.ending_at.timestamp_millis().to_string()),
            (FIELD_VIEWS, "0".to_string()),
            (FIELD_LIKES, "0".to_string()),
            (FIELD_BIDS, "0".to_string()),
            (FIELD_PRICE, self.price.to_string()),
        ]
        .into_iter()
        .map(|(field, value)| (field.to_string(), value))
        .collect()
    }
}

/// A bid request
#[derive(Debug, Clone)]
pub struct CreateBidAttrs {
    pub item_id: String,
    pub user_id: String,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

/// An entry of an item's bid log
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

impl Bid {
    /// Encode as `"<amount>:<created_at_ms>"`.
    pub fn encode(&self) -> String {
        format!("{}:{}", self.amount, self.created_at.timestamp_millis())
    }

    /// Decode a log entry. Entries written with a space separator are
    /// accepted too.
    pub fn decode(stored: &str) -> Result<Self> {
        let malformed = || RbayError::InvalidData(format!("malformed bid record: {}", stored));

        let (amount, created_at) = stored
            .split_once(':')
            .or_else(|| stored.split_once(' '))
            .ok_or_else(malformed)?;
        let amount: f64 = amount.trim().parse().map_err(|_| malformed())?;
        let millis: i64 = created_at.trim().parse().map_err(|_| malformed())?;

        Ok(Self {
            amount,
            created_at: from_millis(millis).ok_or_else(malformed)?,
        })
    }
}
