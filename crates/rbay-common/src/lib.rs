//! rbay Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all rbay components:
//! - Error types and error codes
//! - Key namespace layout of the shared store
//! - Identifier, token and timestamp helpers

pub mod error;
pub mod keys;
pub mod utils;

// Re-exports for convenience
pub use error::{ErrorCode, RbayError, Result};
pub use utils::{current_timestamp, from_millis, gen_id, gen_token};
