//! rbay Store - storage capability layer
//!
//! This crate provides:
//! - The `KvStore` capability interface consumed by the lock and auction layers
//! - Atomic procedure descriptors and the `ProcedureRunner`
//! - A Redis-backed store with an explicit connect/disconnect lifecycle
//! - An in-process store for tests and single-process use

pub mod memory;
pub mod procedure;
pub mod range;
pub mod redis_store;
pub mod traits;

pub use memory::MemoryStore;
pub use procedure::{
    BUILTIN_PROCEDURES, COMPARE_AND_DELETE, DEDUP_AND_AGGREGATE, Procedure, ProcedureRunner,
};
pub use redis_store::RedisStore;
pub use traits::KvStore;
