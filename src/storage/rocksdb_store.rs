use crate::storage::traits::{BatchOp, KvIter, KvStore, WriteBatch};
use anyhow::Result;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch as RocksWriteBatch, DB};
use std::path::{Path, PathBuf};

pub struct RocksKvStore {
    db: DB,
    path: PathBuf,
}

impl RocksKvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path.as_ref())?;
        Ok(Self { db, path: path.as_ref().to_path_buf() })
    }
}

impl KvStore for RocksKvStore {
    fn name(&self) -> String { "rocksdb".into() }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete(key)?;
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut rb = RocksWriteBatch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put(k, v) => rb.put(k, v),
                BatchOp::Delete(k) => rb.delete(k),
            }
        }
        self.db.write(rb)?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<KvIter> {
        let mut items = Vec::new();
        let iter = self.db.iterator(IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (k, v) = item?;
            if !k.starts_with(prefix) {
                break;
            }
            items.push((k.to_vec(), v.to_vec()));
        }
        Ok(KvIter { items })
    }

    fn clear(&self) -> Result<()> {
        let mut rb = RocksWriteBatch::default();
        for item in self.db.iterator(IteratorMode::Start) {
            let (k, _) = item?;
            rb.delete(k);
        }
        self.db.write(rb)?;
        Ok(())
    }

    fn path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }
}
