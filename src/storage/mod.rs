//! Storage module: abstraction over persistent key-value backends.
//!
//! Engines: in-memory (default, tests/dev), simple FS fallback, RocksDB (feature "rocksdb-db").
//! Use `storage::open(path, engine)` to create an Arc<dyn KvStore> to pass to the state driver.

pub mod traits;
pub mod mem_store;
pub mod fs_store;

#[cfg(feature = "rocksdb")]
pub mod rocksdb_store;

pub use traits::{BatchOp, KvIter, KvStore, WriteBatch};
pub use mem_store::MemKvStore;
pub use fs_store::FsKvStore;

#[cfg(feature = "rocksdb")]
pub use rocksdb_store::RocksKvStore;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Engine selection enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    #[default]
    Memory,
    Fs,
    RocksDb,
}

impl std::str::FromStr for StorageEngine {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "fs" => Ok(Self::Fs),
            "rocksdb" => Ok(Self::RocksDb),
            other => bail!("unknown storage engine: {}", other),
        }
    }
}

/// Open a KvStore from path using the requested engine
pub fn open(path: impl AsRef<Path>, engine: StorageEngine) -> Result<Arc<dyn KvStore>> {
    match engine {
        StorageEngine::Memory => Ok(Arc::new(MemKvStore::new())),
        StorageEngine::Fs => {
            let s = FsKvStore::open(path)?;
            Ok(Arc::new(s))
        }
        #[cfg(feature = "rocksdb")]
        StorageEngine::RocksDb => {
            let s = RocksKvStore::open(path)?;
            Ok(Arc::new(s))
        }
        #[cfg(not(feature = "rocksdb"))]
        StorageEngine::RocksDb => bail!("rocksdb engine requested but the rocksdb-db feature is disabled"),
    }
}
