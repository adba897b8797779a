//! rbay Auction - items, bids and views over the shared store
//!
//! This crate provides:
//! - The item and bid data model with its hash/list encoding
//! - The bid commit protocol, run under the item's lock
//! - Bid history paging, item rankings and distinct-viewer counting

mod bids;
mod items;
mod model;
mod service;
mod views;

pub use items::load_item;
pub use model::*;
pub use service::AuctionService;

use metrics::describe_counter;

/// Register descriptions for the auction metrics.
pub fn describe_metrics() {
    describe_counter!("bids_committed_total", "Total number of committed bids");
    describe_counter!(
        "bids_rejected_total",
        "Total number of aborted bids, labelled by reason"
    );
}
