use crate::codec::{encode, from_json};
use crate::crypto::hash_bytes;
use crate::state::driver::{DEFAULT_HASH, DEFAULT_HEIGHT};
use crate::storage::{KvStore, WriteBatch};
use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

const BLOCK_PREFIX: &str = "__blocks__/n/";
const HASH_PREFIX: &str = "__blocks__/h/";
const TX_PREFIX: &str = "__blocks__/tx/";
const HEIGHT_KEY: &str = "__blocks__/height";
const LATEST_KEY: &str = "__blocks__/latest";

/// A stored block: finalized transactions plus their derived hash and index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    pub index: u64,
    pub transactions: Vec<JsonValue>,
}

/// Where a transaction lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct TxLocation {
    block: u64,
    position: u32,
}

/// Block storage collaborator used when blocks are enabled.
pub trait BlockStorage: Send + Sync {
    /// Index of the latest block; -1 when empty
    fn height(&self) -> Result<i64>;

    /// Hash of the latest block; 64 zeros when empty
    fn latest_hash(&self) -> Result<String>;

    fn get_block_by_hash(&self, hash: &str) -> Result<Option<Block>>;

    fn get_block_by_index(&self, index: u64) -> Result<Option<Block>>;

    fn get_transaction_by_hash(&self, hash: &str) -> Result<Option<JsonValue>>;

    /// Seal `txs` into the next block and return it.
    fn store_txs(&self, txs: Vec<JsonValue>) -> Result<Block>;
}

/// Hash of a block body: SHA3-256 over the canonical encoding of its transactions.
pub fn block_hash(txs: &[JsonValue]) -> Result<String> {
    let value = from_json(&JsonValue::Array(txs.to_vec()))?;
    Ok(hash_bytes(encode(&value).as_bytes()))
}

/// Block storage over any `KvStore`, under the `__blocks__/` key space.
pub struct KvBlockStore {
    store: Arc<dyn KvStore>,
    // serializes store_txs so two writers never claim the same index
    write_lock: Mutex<()>,
}

impl KvBlockStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store, write_lock: Mutex::new(()) }
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn block_key(index: u64) -> String {
        // fixed width keeps prefix scans in index order
        format!("{}{:020}", BLOCK_PREFIX, index)
    }
}

impl BlockStorage for KvBlockStore {
    fn height(&self) -> Result<i64> {
        Ok(self.get_json::<i64>(HEIGHT_KEY)?.unwrap_or(DEFAULT_HEIGHT))
    }

    fn latest_hash(&self) -> Result<String> {
        Ok(self.get_json::<String>(LATEST_KEY)?.unwrap_or_else(|| DEFAULT_HASH.to_string()))
    }

    fn get_block_by_hash(&self, hash: &str) -> Result<Option<Block>> {
        match self.get_json::<u64>(&format!("{}{}", HASH_PREFIX, hash))? {
            Some(index) => self.get_block_by_index(index),
            None => Ok(None),
        }
    }

    fn get_block_by_index(&self, index: u64) -> Result<Option<Block>> {
        self.get_json(&Self::block_key(index))
    }

    fn get_transaction_by_hash(&self, hash: &str) -> Result<Option<JsonValue>> {
        let loc: TxLocation = match self.get_json(&format!("{}{}", TX_PREFIX, hash))? {
            Some(loc) => loc,
            None => return Ok(None),
        };
        let block = self
            .get_block_by_index(loc.block)?
            .ok_or_else(|| anyhow!("block {} referenced by tx {} is missing", loc.block, hash))?;
        Ok(block.transactions.get(loc.position as usize).cloned())
    }

    fn store_txs(&self, txs: Vec<JsonValue>) -> Result<Block> {
        let _guard = self.write_lock.lock();
        let index = u64::try_from(self.height()? + 1)?;
        let hash = block_hash(&txs)?;
        let block = Block { hash: hash.clone(), index, transactions: txs };

        let mut batch = WriteBatch::new();
        batch.put(Self::block_key(index).into_bytes(), serde_json::to_vec(&block)?);
        batch.put(format!("{}{}", HASH_PREFIX, hash).into_bytes(), serde_json::to_vec(&index)?);
        for (position, tx) in block.transactions.iter().enumerate() {
            if let Some(tx_hash) = tx.get("hash").and_then(JsonValue::as_str) {
                let loc = TxLocation { block: index, position: position as u32 };
                batch.put(format!("{}{}", TX_PREFIX, tx_hash).into_bytes(), serde_json::to_vec(&loc)?);
            }
        }
        batch.put(HEIGHT_KEY.as_bytes().to_vec(), serde_json::to_vec(&(index as i64))?);
        batch.put(LATEST_KEY.as_bytes().to_vec(), serde_json::to_vec(&hash)?);
        self.store.write_batch(batch)?;

        info!(index, hash = %block.hash, txs = block.transactions.len(), "block stored");
        Ok(block)
    }
}
