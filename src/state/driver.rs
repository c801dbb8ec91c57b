//! State driver.
//!
//! Two layers sit on top of the backing store:
//! - the write cache: every write since the last `commit`, visible to all reads
//! - the pending set: the writes of the current transaction, handed out as `updates`
//!
//! Values are kept canonical-encoded; `None` in either layer is a delete marker.

use crate::codec::{decode, encode, Value};
use crate::storage::{KvStore, WriteBatch};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Privileged key holding the latest block height.
pub const HEIGHT_KEY: &str = "__H";
/// Privileged key holding the latest block hash.
pub const HASH_KEY: &str = "__L";

pub const CODE_KEY: &str = "__code__";
pub const COMPILED_KEY: &str = "__compiled__";
pub const OWNER_KEY: &str = "__owner__";
pub const AUTHOR_KEY: &str = "__author__";

pub const DEFAULT_HEIGHT: i64 = -1;
pub const DEFAULT_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// key -> canonical-encoded value, `None` for deleted keys
pub type PendingSet = BTreeMap<String, Option<String>>;

/// Snapshot of the driver's in-process layers.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    cache: PendingSet,
    pending: PendingSet,
}

pub struct StateDriver {
    store: Arc<dyn KvStore>,
    cache: PendingSet,
    pending: PendingSet,
}

impl StateDriver {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store, cache: BTreeMap::new(), pending: BTreeMap::new() }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    fn get_encoded(&self, key: &str) -> Result<Option<String>> {
        if let Some(v) = self.pending.get(key) {
            return Ok(v.clone());
        }
        if let Some(v) = self.cache.get(key) {
            return Ok(v.clone());
        }
        match self.store.get(key.as_bytes())? {
            Some(raw) => Ok(Some(String::from_utf8(raw).map_err(|e| anyhow!("non-utf8 value at {}: {}", key, e))?)),
            None => Ok(None),
        }
    }

    /// Read a value. `None` means absent, `Some(Value::Null)` a stored null.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.get_encoded(key)? {
            Some(s) => Ok(Some(decode(&s).map_err(|e| anyhow!("corrupt value at {}: {}", key, e))?)),
            None => Ok(None),
        }
    }

    pub fn set(&mut self, key: &str, value: &Value) {
        let encoded = encode(value);
        self.pending.insert(key.to_string(), Some(encoded.clone()));
        self.cache.insert(key.to_string(), Some(encoded));
    }

    pub fn delete(&mut self, key: &str) {
        self.pending.insert(key.to_string(), None);
        self.cache.insert(key.to_string(), None);
    }

    pub fn get_pending(&self) -> &PendingSet {
        &self.pending
    }

    /// Hand out the pending set and start a fresh one.
    pub fn take_pending(&mut self) -> PendingSet {
        std::mem::take(&mut self.pending)
    }

    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint { cache: self.cache.clone(), pending: self.pending.clone() }
    }

    pub fn revert(&mut self, checkpoint: Checkpoint) {
        self.cache = checkpoint.cache;
        self.pending = checkpoint.pending;
    }

    /// Write the cache to the backing store in one batch. On failure the cache is
    /// kept so nothing is silently lost.
    pub fn commit(&mut self) -> Result<()> {
        if self.cache.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        for (k, v) in &self.cache {
            match v {
                Some(v) => batch.put(k.as_bytes().to_vec(), v.as_bytes().to_vec()),
                None => batch.delete(k.as_bytes().to_vec()),
            }
        }
        let n = batch.len();
        self.store.write_batch(batch)?;
        self.cache.clear();
        debug!(keys = n, "state committed");
        Ok(())
    }

    /// Drop everything: backing store, cache and pending set.
    pub fn flush(&mut self) -> Result<()> {
        self.store.clear()?;
        self.cache.clear();
        self.pending.clear();
        debug!(store = %self.store.name(), "state flushed");
        Ok(())
    }

    pub fn height(&self) -> Result<i64> {
        Ok(self.get(HEIGHT_KEY)?.and_then(|v| v.as_int()).unwrap_or(DEFAULT_HEIGHT))
    }

    pub fn latest_hash(&self) -> Result<String> {
        Ok(self
            .get(HASH_KEY)?
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_HASH.to_string()))
    }

    pub fn set_height(&mut self, height: i64) {
        self.set(HEIGHT_KEY, &Value::Int(height));
    }

    pub fn set_latest_hash(&mut self, hash: &str) {
        self.set(HASH_KEY, &Value::str(hash));
    }

    fn contract_field(&self, name: &str, field: &str) -> Result<Option<String>> {
        let key = format!("{}.{}", name, field);
        Ok(self.get(&key)?.and_then(|v| match v {
            Value::Str(s) => Some(s),
            _ => None,
        }))
    }

    /// Contract source code
    pub fn get_contract(&self, name: &str) -> Result<Option<String>> {
        self.contract_field(name, CODE_KEY)
    }

    /// Serialized bytecode
    pub fn get_compiled(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match self.contract_field(name, COMPILED_KEY)? {
            Some(h) => Ok(Some(hex::decode(&h).map_err(|e| anyhow!("corrupt bytecode for {}: {}", name, e))?)),
            None => Ok(None),
        }
    }

    pub fn get_owner(&self, name: &str) -> Result<Option<String>> {
        self.contract_field(name, OWNER_KEY)
    }

    pub fn get_author(&self, name: &str) -> Result<Option<String>> {
        self.contract_field(name, AUTHOR_KEY)
    }

    pub fn contract_exists(&self, name: &str) -> Result<bool> {
        Ok(self.get_encoded(&format!("{}.{}", name, CODE_KEY))?.is_some())
    }

    pub fn set_contract(&mut self, name: &str, source: &str, compiled: &[u8], owner: Option<&str>, author: &str) {
        self.set(&format!("{}.{}", name, CODE_KEY), &Value::str(source));
        self.set(&format!("{}.{}", name, COMPILED_KEY), &Value::str(hex::encode(compiled)));
        if let Some(owner) = owner {
            self.set(&format!("{}.{}", name, OWNER_KEY), &Value::str(owner));
        }
        self.set(&format!("{}.{}", name, AUTHOR_KEY), &Value::str(author));
    }
}
