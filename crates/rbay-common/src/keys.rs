//! Key namespace layout
//!
//! Every collaborator sharing the store reads and writes through these
//! builders, so the formats below are part of the external contract.

pub fn page_cache_key(route: &str) -> String {
    format!("pagecache#{}", route)
}

pub fn users_key(user_id: &str) -> String {
    format!("users#{}", user_id)
}

pub fn sessions_key(session_id: &str) -> String {
    format!("session#{}", session_id)
}

pub fn usernames_unique_key() -> &'static str {
    "usernames:unique"
}

pub fn usernames_key() -> &'static str {
    "usernames"
}

// Items

pub fn items_key(item_id: &str) -> String {
    format!("items#{}", item_id)
}

/// Set of every allocated item id
pub fn item_ids_key() -> &'static str {
    "items:ids"
}

/// Global ranking of items by distinct viewers
pub fn items_by_views_key() -> &'static str {
    "item:views"
}

/// Global index of items by closing time (unix millis)
pub fn items_by_ending_at_key() -> &'static str {
    "items:endingAt"
}

/// Per-item set of distinct viewer identifiers
pub fn items_views_key(item_id: &str) -> String {
    format!("items:views#{}", item_id)
}

/// Append-only bid log of one item
pub fn bid_history_key(item_id: &str) -> String {
    format!("history#{}", item_id)
}

/// Global ranking of items by current price
pub fn items_by_price_key() -> &'static str {
    "items:price"
}

// Locks

pub fn lock_key(resource: &str) -> String {
    format!("lock:{}", resource)
}
