//! Utility functions for rbay
//!
//! Random identifiers, lock tokens and timestamp helpers.

use chrono::{DateTime, TimeZone, Utc};

/// Generate a random identifier for a new entity.
///
/// Callers that need uniqueness must still claim the id in the store.
///
/// # Examples
///
/// ```
/// use rbay_common::gen_id;
///
/// let id = gen_id();
/// assert_eq!(id.len(), 16);
/// assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
pub fn gen_id() -> String {
    const_hex::encode(rand::random::<[u8; 8]>())
}

/// Generate an unguessable token identifying one lock acquisition attempt.
pub fn gen_token() -> String {
    const_hex::encode(rand::random::<[u8; 16]>())
}

/// Current unix time in milliseconds
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert unix millis to a UTC timestamp, `None` when out of range.
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique() {
        let a = gen_token();
        let b = gen_token();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_ids_are_long_enough_to_avoid_collisions() {
        let ids: std::collections::HashSet<String> = (0..10_000).map(|_| gen_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_current_timestamp_tracks_clock() {
        let before = Utc::now().timestamp_millis();
        let ts = current_timestamp();
        assert!(ts >= before);
        assert!(from_millis(ts).is_some());
    }

    #[test]
    fn test_from_millis() {
        let now = Utc::now();
        let back = from_millis(now.timestamp_millis()).unwrap();
        assert_eq!(back.timestamp_millis(), now.timestamp_millis());
        assert!(from_millis(i64::MAX).is_none());
    }
}
