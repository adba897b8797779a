//! Atomic procedures
//!
//! A procedure is a named routine the store executes indivisibly over a
//! fixed number of keys plus arguments. Backends register the builtins at
//! construction; `ProcedureRunner` is the only caller.

use std::collections::HashMap;
use std::sync::Arc;

use rbay_common::{RbayError, Result};
use tracing::debug;

use crate::traits::KvStore;

/// Descriptor of a server-side procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Procedure {
    pub name: &'static str,
    /// Number of leading entries of the invocation that are keys
    pub num_keys: usize,
    /// Lua source for stores with a scripting facility
    pub script: &'static str,
}

/// Delete `KEYS[1]` only if it still holds the token `ARGV[1]`.
///
/// Replies 1 when the key was deleted, 0 otherwise.
pub const COMPARE_AND_DELETE: Procedure = Procedure {
    name: "unlock",
    num_keys: 1,
    script: r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
",
};

/// Count a viewer at most once per item.
///
/// Keys: per-item viewer set, item hash, global view ranking.
/// Args: item id, viewer id. Replies 1 when the viewer was new. Key types
/// are checked before any write.
pub const DEDUP_AND_AGGREGATE: Procedure = Procedure {
    name: "increment_view",
    num_keys: 3,
    script: r"
local function usable(key, kind)
    local found = redis.call('TYPE', key).ok
    return found == 'none' or found == kind
end
if not (usable(KEYS[1], 'string') and usable(KEYS[2], 'hash') and usable(KEYS[3], 'zset')) then
    return redis.error_reply('WRONGTYPE increment_view key holds the wrong kind of value')
end
local inserted = redis.call('PFADD', KEYS[1], ARGV[2])
if inserted == 1 then
    redis.call('HINCRBY', KEYS[2], 'views', 1)
    redis.call('ZINCRBY', KEYS[3], 1, ARGV[1])
end
return inserted
",
};

pub const BUILTIN_PROCEDURES: [Procedure; 2] = [COMPARE_AND_DELETE, DEDUP_AND_AGGREGATE];

/// Runs registered procedures against a store
#[derive(Clone)]
pub struct ProcedureRunner {
    store: Arc<dyn KvStore>,
    registry: HashMap<&'static str, Procedure>,
}

impl ProcedureRunner {
    /// Create a runner with the builtin procedures registered.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        let registry = BUILTIN_PROCEDURES.iter().map(|p| (p.name, *p)).collect();
        Self { store, registry }
    }

    pub fn register(&mut self, procedure: Procedure) {
        self.registry.insert(procedure.name, procedure);
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Run the named procedure. Unknown names and key-arity mismatches are
    /// rejected before the store is contacted.
    pub async fn run(&self, name: &str, keys: &[String], args: &[String]) -> Result<Option<i64>> {
        let procedure = self
            .registry
            .get(name)
            .ok_or_else(|| RbayError::ProcedureNotFound(name.to_string()))?;

        if keys.len() != procedure.num_keys {
            return Err(RbayError::InvalidArgument(format!(
                "procedure '{}' takes {} keys, got {}",
                name,
                procedure.num_keys,
                keys.len()
            )));
        }

        debug!(procedure = name, keys = ?keys, "running atomic procedure");
        self.store.eval(procedure, keys, args).await
    }

    /// Delete `key` if it still holds `token`. Returns whether it was deleted.
    pub async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool> {
        let reply = self
            .run(
                COMPARE_AND_DELETE.name,
                &[key.to_string()],
                &[token.to_string()],
            )
            .await?;
        Ok(reply.unwrap_or(0) == 1)
    }

    /// Record `viewer_id` for `item_id`, bumping the aggregates only the
    /// first time. Returns whether the viewer was new.
    pub async fn dedup_and_aggregate(
        &self,
        viewers_key: &str,
        item_key: &str,
        ranking_key: &str,
        item_id: &str,
        viewer_id: &str,
    ) -> Result<bool> {
        let reply = self
            .run(
                DEDUP_AND_AGGREGATE.name,
                &[
                    viewers_key.to_string(),
                    item_key.to_string(),
                    ranking_key.to_string(),
                ],
                &[item_id.to_string(), viewer_id.to_string()],
            )
            .await?;
        Ok(reply.unwrap_or(0) == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use std::time::Duration;

    fn runner() -> (Arc<MemoryStore>, ProcedureRunner) {
        let store = Arc::new(MemoryStore::new());
        let runner = ProcedureRunner::new(store.clone());
        (store, runner)
    }

    #[tokio::test]
    async fn test_unknown_procedure() {
        let (_, runner) = runner();
        let err = runner.run("missing", &[], &[]).await.unwrap_err();
        assert_eq!(err, RbayError::ProcedureNotFound("missing".to_string()));
    }

    #[tokio::test]
    async fn test_key_arity_mismatch() {
        let (_, runner) = runner();
        let err = runner
            .run("unlock", &["a".to_string(), "b".to_string()], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RbayError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let (store, runner) = runner();
        store
            .set_nx_px("lock:x", "token-a", Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!runner.compare_and_delete("lock:x", "token-b").await.unwrap());
        assert_eq!(
            store.get("lock:x").await.unwrap(),
            Some("token-a".to_string())
        );

        assert!(runner.compare_and_delete("lock:x", "token-a").await.unwrap());
        assert_eq!(store.get("lock:x").await.unwrap(), None);

        // Key already gone
        assert!(!runner.compare_and_delete("lock:x", "token-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_dedup_and_aggregate_counts_once() {
        let (store, runner) = runner();

        let first = runner
            .dedup_and_aggregate("items:views#1", "items#1", "item:views", "1", "alice")
            .await
            .unwrap();
        let again = runner
            .dedup_and_aggregate("items:views#1", "items#1", "item:views", "1", "alice")
            .await
            .unwrap();
        let other = runner
            .dedup_and_aggregate("items:views#1", "items#1", "item:views", "1", "bob")
            .await
            .unwrap();

        assert!(first);
        assert!(!again);
        assert!(other);

        let item = store.hgetall("items#1").await.unwrap();
        assert_eq!(item.get("views").map(String::as_str), Some("2"));
        assert_eq!(store.zscore("item:views", "1").await.unwrap(), Some(2.0));
    }
}
