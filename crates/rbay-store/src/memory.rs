//! In-process store
//!
//! Holds the whole keyspace behind one mutex, so every primitive and every
//! procedure is indivisible with respect to other callers. Expired keys are
//! dropped lazily when touched.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rbay_common::{RbayError, Result};

use crate::procedure::{COMPARE_AND_DELETE, DEDUP_AND_AGGREGATE, Procedure};
use crate::range;
use crate::traits::KvStore;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    ZSet(HashMap<String, f64>),
    List(Vec<String>),
    Set(HashSet<String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Hash(_) => "hash",
            Value::ZSet(_) => "zset",
            Value::List(_) => "list",
            Value::Set(_) => "set",
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

type LocalProcedure = fn(&mut Keyspace, &[String], &[String]) -> Result<Option<i64>>;

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

fn wrong_type(key: &str, expected: &str, found: &Value) -> RbayError {
    RbayError::InvalidData(format!(
        "key '{}' holds a {}, expected a {}",
        key,
        found.kind(),
        expected
    ))
}

impl Keyspace {
    fn purge_if_expired(&mut self, key: &str) {
        let expired = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| Instant::now() >= at);
        if expired {
            self.entries.remove(key);
        }
    }

    fn lookup(&mut self, key: &str) -> Option<&mut Value> {
        self.purge_if_expired(key);
        self.entries.get_mut(key).map(|e| &mut e.value)
    }

    fn lookup_or_insert(&mut self, key: &str, default: fn() -> Value) -> &mut Value {
        self.purge_if_expired(key);
        &mut self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                value: default(),
                expires_at: None,
            })
            .value
    }

    fn get(&mut self, key: &str) -> Result<Option<String>> {
        match self.lookup(key) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(other) => Err(wrong_type(key, "string", other)),
        }
    }

    fn set(&mut self, key: &str, value: &str, expiry: Option<Duration>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: expiry.map(|d| Instant::now() + d),
            },
        );
    }

    fn del(&mut self, key: &str) -> bool {
        self.purge_if_expired(key);
        self.entries.remove(key).is_some()
    }

    fn hash_mut(&mut self, key: &str) -> Result<&mut HashMap<String, String>> {
        match self.lookup_or_insert(key, || Value::Hash(HashMap::new())) {
            Value::Hash(h) => Ok(h),
            other => Err(wrong_type(key, "hash", other)),
        }
    }

    fn zset_mut(&mut self, key: &str) -> Result<&mut HashMap<String, f64>> {
        match self.lookup_or_insert(key, || Value::ZSet(HashMap::new())) {
            Value::ZSet(z) => Ok(z),
            other => Err(wrong_type(key, "zset", other)),
        }
    }

    fn set_mut(&mut self, key: &str) -> Result<&mut HashSet<String>> {
        match self.lookup_or_insert(key, || Value::Set(HashSet::new())) {
            Value::Set(s) => Ok(s),
            other => Err(wrong_type(key, "set", other)),
        }
    }

    fn list_mut(&mut self, key: &str) -> Result<&mut Vec<String>> {
        match self.lookup_or_insert(key, || Value::List(Vec::new())) {
            Value::List(l) => Ok(l),
            other => Err(wrong_type(key, "list", other)),
        }
    }

    /// Fail unless `key` is absent or holds a value of kind `expected`.
    fn check_kind(&mut self, key: &str, expected: &str) -> Result<()> {
        match self.lookup(key) {
            Some(value) if value.kind() != expected => Err(wrong_type(key, expected, value)),
            _ => Ok(()),
        }
    }

    /// Sorted members, ascending by score then member.
    fn zsorted(&mut self, key: &str) -> Result<Vec<(String, f64)>> {
        let mut members: Vec<(String, f64)> = match self.lookup(key) {
            None => return Ok(Vec::new()),
            Some(Value::ZSet(z)) => z.iter().map(|(m, s)| (m.clone(), *s)).collect(),
            Some(other) => return Err(wrong_type(key, "zset", other)),
        };
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(members)
    }
}

fn compare_and_delete(ks: &mut Keyspace, keys: &[String], args: &[String]) -> Result<Option<i64>> {
    let (key, token) = (&keys[0], arg(args, 0)?);
    if ks.get(key)?.as_deref() == Some(token) {
        ks.del(key);
        return Ok(Some(1));
    }
    Ok(Some(0))
}

fn dedup_and_aggregate(
    ks: &mut Keyspace,
    keys: &[String],
    args: &[String],
) -> Result<Option<i64>> {
    let (item_id, viewer_id) = (arg(args, 0)?, arg(args, 1)?);

    // Nothing is written unless every key can take its update
    ks.check_kind(&keys[0], "set")?;
    ks.check_kind(&keys[1], "hash")?;
    ks.check_kind(&keys[2], "zset")?;
    if let Some(Value::Hash(item)) = ks.lookup(&keys[1])
        && let Some(views) = item.get("views")
        && views.parse::<i64>().is_err()
    {
        return Err(RbayError::InvalidData(format!(
            "views is not an integer: {}",
            views
        )));
    }

    if !ks.set_mut(&keys[0])?.insert(viewer_id.to_string()) {
        return Ok(Some(0));
    }

    let item = ks.hash_mut(&keys[1])?;
    let views = match item.get("views") {
        Some(v) => v
            .parse::<i64>()
            .map_err(|_| RbayError::InvalidData(format!("views is not an integer: {}", v)))?,
        None => 0,
    };
    item.insert("views".to_string(), (views + 1).to_string());

    *ks.zset_mut(&keys[2])?
        .entry(item_id.to_string())
        .or_insert(0.0) += 1.0;
    Ok(Some(1))
}

fn arg(args: &[String], index: usize) -> Result<&str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| RbayError::InvalidArgument(format!("missing argument {}", index + 1)))
}

/// Single-process `KvStore`
pub struct MemoryStore {
    keyspace: Mutex<Keyspace>,
    procedures: HashMap<&'static str, LocalProcedure>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut procedures: HashMap<&'static str, LocalProcedure> = HashMap::new();
        procedures.insert(COMPARE_AND_DELETE.name, compare_and_delete);
        procedures.insert(DEDUP_AND_AGGREGATE.name, dedup_and_aggregate);
        Self {
            keyspace: Mutex::new(Keyspace::default()),
            procedures,
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let mut ks = self.keyspace.lock();
        let now = Instant::now();
        ks.entries
            .retain(|_, e| e.expires_at.is_none_or(|at| now < at));
        ks.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.keyspace.lock().get(key)
    }

    async fn set(&self, key: &str, value: &str, expiry: Option<Duration>) -> Result<()> {
        self.keyspace.lock().set(key, value, expiry);
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut ks = self.keyspace.lock();
        if ks.lookup(key).is_some() {
            return Ok(false);
        }
        ks.set(key, value, Some(ttl));
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<bool> {
        Ok(self.keyspace.lock().del(key))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        match self.keyspace.lock().lookup(key) {
            None => Ok(HashMap::new()),
            Some(Value::Hash(h)) => Ok(h.clone()),
            Some(other) => Err(wrong_type(key, "hash", other)),
        }
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        let mut ks = self.keyspace.lock();
        let hash = ks.hash_mut(key)?;
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.keyspace
            .lock()
            .zset_mut(key)?
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        match self.keyspace.lock().lookup(key) {
            None => Ok(None),
            Some(Value::ZSet(z)) => Ok(z.get(member).copied()),
            Some(other) => Err(wrong_type(key, "zset", other)),
        }
    }

    async fn zrange(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        rev: bool,
    ) -> Result<Vec<(String, f64)>> {
        let mut members = self.keyspace.lock().zsorted(key)?;
        if rev {
            members.reverse();
        }
        Ok(match range::resolve(members.len(), start, stop) {
            Some((lo, hi)) => members.drain(lo..=hi).collect(),
            None => Vec::new(),
        })
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>> {
        let members = self.keyspace.lock().zsorted(key)?;
        Ok(members
            .into_iter()
            .filter(|(_, score)| *score >= min && *score <= max)
            .skip(offset)
            .take(count)
            .map(|(member, _)| member)
            .collect())
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64> {
        let mut ks = self.keyspace.lock();
        let list = ks.list_mut(key)?;
        list.push(value.to_string());
        Ok(list.len() as u64)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        match self.keyspace.lock().lookup(key) {
            None => Ok(Vec::new()),
            Some(Value::List(list)) => Ok(match range::resolve(list.len(), start, stop) {
                Some((lo, hi)) => list[lo..=hi].to_vec(),
                None => Vec::new(),
            }),
            Some(other) => Err(wrong_type(key, "list", other)),
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .keyspace
            .lock()
            .set_mut(key)?
            .insert(member.to_string()))
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        match self.keyspace.lock().lookup(key) {
            None => Ok(false),
            Some(Value::Set(s)) => Ok(s.contains(member)),
            Some(other) => Err(wrong_type(key, "set", other)),
        }
    }

    async fn eval(
        &self,
        procedure: &Procedure,
        keys: &[String],
        args: &[String],
    ) -> Result<Option<i64>> {
        let local = self
            .procedures
            .get(procedure.name)
            .ok_or_else(|| RbayError::ProcedureNotFound(procedure.name.to_string()))?;
        if keys.len() != procedure.num_keys {
            return Err(RbayError::InvalidArgument(format!(
                "procedure '{}' takes {} keys, got {}",
                procedure.name,
                procedure.num_keys,
                keys.len()
            )));
        }
        let mut ks = self.keyspace.lock();
        local(&mut ks, keys, args)
    }
}
