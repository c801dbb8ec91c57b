use anyhow::Result;
use std::path::PathBuf;

/// Simple KV iterator returned by `scan_prefix`
pub struct KvIter {
    // each item: (key, value), ascending key order
    pub items: Vec<(Vec<u8>, Vec<u8>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// A write-batch to apply multiple put/delete operations in one call.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    pub ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key, value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete(key));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Core key-value store trait (synchronous; callers serialize access to the state
/// driver, the store itself only needs to be shareable).
pub trait KvStore: Send + Sync + 'static {
    fn name(&self) -> String;

    /// Put a key / value
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Get a key
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Delete a key
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Check existence
    fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Apply a write batch
    fn write_batch(&self, batch: WriteBatch) -> Result<()>;

    /// Scan by prefix. Returns the full set; engines may stream in future.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<KvIter>;

    /// Remove every key (administrative reset)
    fn clear(&self) -> Result<()>;

    /// Path where the engine stores data (useful for debugging)
    fn path(&self) -> Option<PathBuf>;
}
