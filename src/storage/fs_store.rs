use crate::storage::traits::{BatchOp, KvIter, KvStore, WriteBatch};
use anyhow::Result;
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// One file per key, named by the hex of the key. Slow but dependency-free;
/// useful for inspecting state by hand.
pub struct FsKvStore {
    dir: PathBuf,
    // serializes writers so a batch is not interleaved with another put
    write_lock: Mutex<()>,
}

impl FsKvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let dir = path.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, write_lock: Mutex::new(()) })
    }

    fn key_path(&self, key: &[u8]) -> PathBuf {
        self.dir.join(hex::encode(key))
    }

    fn write_file(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let p = self.key_path(key);
        let tmp = p.with_extension("tmp");
        let mut f = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp)?;
        f.write_all(value)?;
        f.sync_all()?;
        fs::rename(&tmp, &p)?;
        Ok(())
    }

    fn remove_file(&self, key: &[u8]) -> Result<()> {
        let p = self.key_path(key);
        if p.exists() {
            fs::remove_file(&p)?;
        }
        Ok(())
    }

    fn read_file(path: &Path) -> Result<Vec<u8>> {
        let mut f = OpenOptions::new().read(true).open(path)?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl KvStore for FsKvStore {
    fn name(&self) -> String { "fs".into() }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.write_file(key, value)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let p = self.key_path(key);
        if !p.exists() {
            return Ok(None);
        }
        Ok(Some(Self::read_file(&p)?))
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.remove_file(key)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let _guard = self.write_lock.lock();
        for op in &batch.ops {
            match op {
                BatchOp::Put(k, v) => self.write_file(k, v)?,
                BatchOp::Delete(k) => self.remove_file(k)?,
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<KvIter> {
        let mut items = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().into_string().unwrap_or_default();
            let key = match hex::decode(&name) {
                Ok(k) => k,
                Err(_) => continue,
            };
            if key.starts_with(prefix) {
                items.push((key, Self::read_file(&entry.path())?));
            }
        }
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(KvIter { items })
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    fn path(&self) -> Option<PathBuf> {
        Some(self.dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FsKvStore::open(dir.path()).unwrap();
            store.put(b"con.v", b"\"hello\"").unwrap();
            let mut batch = WriteBatch::new();
            batch.put(b"con.w".to_vec(), b"1".to_vec());
            batch.delete(b"missing".to_vec());
            store.write_batch(batch).unwrap();
        }
        let store = FsKvStore::open(dir.path()).unwrap();
        assert_eq!(store.get(b"con.v").unwrap(), Some(b"\"hello\"".to_vec()));
        let scanned = store.scan_prefix(b"con.").unwrap();
        assert_eq!(scanned.items.len(), 2);
        assert_eq!(scanned.items[0].0, b"con.v".to_vec());

        store.clear().unwrap();
        assert_eq!(store.get(b"con.w").unwrap(), None);
    }
}
