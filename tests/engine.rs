mod common;

use common::{Harness, COUNTER};
use serde_json::json;
use stampchain::codec::Value;
use stampchain::crypto::Keypair;
use stampchain::runtime::{tx_hash, EngineConfig, ExecutionOutput, RollbackPolicy, Status};
use stampchain::state::StateDriver;
use stampchain::storage::{FsKvStore, KvIter, KvStore, MemKvStore, WriteBatch};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[test]
fn test_submit_set_get() {
    let mut h = Harness::new(EngineConfig::default());
    let kp = Keypair::generate();

    let out = h.submit(&kp, "counter", COUNTER, None, None);
    assert_eq!(out.status, Status::Success, "{:?}", out.result);
    assert!(out.updates.contains_key("counter.__code__"));
    assert_eq!(h.driver.get_author("counter").unwrap(), Some(kp.public_hex()));

    let out = h.call(&kp, "counter", "set", &[("v", Value::Int(5))]);
    assert_eq!(out.status, Status::Success);
    assert_eq!(out.updates.get("counter.x"), Some(&Some("5".to_string())));

    let out = h.call(&kp, "counter", "get", &[]);
    assert_eq!(out.status, Status::Success);
    assert_eq!(out.result, Value::Int(5));
    assert!(out.updates.is_empty());
}

#[test]
fn test_missing_contract() {
    let mut h = Harness::new(EngineConfig::default());
    let out = h.call(&Keypair::generate(), "nope", "get", &[]);
    assert_eq!(out.status, Status::RuntimeException);
    assert_eq!(out.result, Value::str("Module nope not found"));
    assert!(out.updates.is_empty());
}

#[test]
fn test_malformed_transactions_do_nothing() {
    let mut h = Harness::new(EngineConfig::default());
    h.install("counter", COUNTER);
    let kp = Keypair::generate();

    let mut tx = h.tx(&kp, "counter", "set", &[("v", Value::Int(1))]);
    tx.as_object_mut().unwrap().remove("payload");
    let out = h.run(&tx);
    assert_eq!(out.status, Status::MalformedTx);
    assert!(out.updates.is_empty());

    let mut tx = h.tx(&kp, "counter", "set", &[("v", Value::Int(1))]);
    tx["surprise"] = json!(true);
    assert_eq!(h.run(&tx).status, Status::MalformedTx);

    assert_eq!(h.driver.get("counter.x").unwrap(), None);
}

#[test]
fn test_flipped_signature_byte() {
    let mut h = Harness::new(EngineConfig::default());
    h.install("counter", COUNTER);
    let kp = Keypair::generate();
    let mut tx = h.tx(&kp, "counter", "set", &[("v", Value::Int(1))]);

    let sig = tx["signature"].as_str().unwrap().to_string();
    let mut bytes = hex::decode(&sig).unwrap();
    bytes[10] ^= 0x01;
    tx["signature"] = json!(hex::encode(bytes));

    let out = h.run(&tx);
    assert_eq!(out.status, Status::InvalidSignature);
    assert!(out.updates.is_empty());
    assert_eq!(h.driver.get("counter.x").unwrap(), None);
}

#[test]
fn test_batch_runs_in_order() {
    let mut h = Harness::new(EngineConfig::default());
    h.install("counter", COUNTER);
    let kp = Keypair::generate();
    let txs = vec![
        h.tx(&kp, "counter", "set", &[("v", Value::Int(1))]),
        h.tx(&kp, "counter", "get", &[]),
        h.tx(&kp, "counter", "incr", &[]),
    ];

    let results = h.engine.run_all(&mut h.driver, &txs);
    assert_eq!(results.len(), 3);
    for (i, (input, _)) in results.iter().enumerate() {
        assert_eq!(input["index"], json!(i));
    }
    assert_eq!(results[1].1.result, Value::Int(1));
    assert_eq!(results[2].1.result, Value::Int(2));
}

#[test]
fn test_batch_member_without_index_is_malformed_alone() {
    let mut h = Harness::new(EngineConfig::default());
    h.install("counter", COUNTER);
    let kp = Keypair::generate();
    let tx = h.tx(&kp, "counter", "get", &[]);
    // batch members carry an index; a standalone run must not
    let mut indexed = tx.clone();
    indexed["index"] = json!(0);
    assert_eq!(h.run(&indexed).status, Status::MalformedTx);
    assert_eq!(h.engine.run(&mut h.driver, &tx, true).status, Status::MalformedTx);
}

#[test]
fn test_rollback_discard() {
    let mut h = Harness::new(EngineConfig::default());
    h.install("counter", COUNTER);
    let kp = Keypair::generate();
    h.call(&kp, "counter", "set", &[("v", Value::Int(3))]);

    let out = h.call(&kp, "counter", "boom", &[]);
    assert_eq!(out.status, Status::RuntimeException);
    assert_eq!(out.result, Value::str("assertion failed: boom"));
    assert!(out.updates.is_empty());
    assert_eq!(h.driver.get("counter.x").unwrap(), Some(Value::Int(3)));
}

#[test]
fn test_rollback_retain_partial() {
    let config = EngineConfig { rollback: RollbackPolicy::RetainPartial, ..EngineConfig::default() };
    let mut h = Harness::new(config);
    h.install("counter", COUNTER);
    let kp = Keypair::generate();

    let out = h.call(&kp, "counter", "boom", &[]);
    assert_eq!(out.status, Status::RuntimeException);
    assert_eq!(out.updates.get("counter.x"), Some(&Some("99".to_string())));
    assert_eq!(h.driver.get("counter.x").unwrap(), Some(Value::Int(99)));
}

#[test]
fn test_context_at_entry() {
    let mut h = Harness::new(EngineConfig::default());
    h.install("counter", COUNTER);
    let kp = Keypair::generate();
    let out = h.call(&kp, "counter", "who", &[]);
    let me = Value::str(kp.public_hex());
    assert_eq!(out.result, Value::List(vec![me.clone(), me, Value::str("counter")]));
}

#[test]
fn test_timestamps_reach_now() {
    let config = EngineConfig { timestamps: true, ..EngineConfig::default() };
    let mut h = Harness::new(config);
    h.install("clock", "export fn at() { return now(); }");
    let kp = Keypair::generate();
    assert_eq!(h.call(&kp, "clock", "at", &[]).result, Value::Int(1_700_000_000));

    // payload without timestamp is malformed when timestamps are on
    h.timestamp = None;
    assert_eq!(h.call(&kp, "clock", "at", &[]).status, Status::MalformedTx);
}

#[test]
fn test_rand_int_is_deterministic_per_tx() {
    let mut h = Harness::new(EngineConfig::default());
    h.install("dice", "export fn roll() { return [rand_int(1, 6), rand_int(1, 1000000)]; }");
    let kp = Keypair::generate();
    let tx = h.tx(&kp, "dice", "roll", &[]);
    let a = h.run(&tx).result;
    let b = h.run(&tx).result;
    assert_eq!(a, b);
}

#[test]
fn test_tx_hash_ignores_key_order() {
    let kp = Keypair::generate();
    let mut h = Harness::new(EngineConfig::default());
    let tx = h.tx(&kp, "counter", "get", &[]);
    let reordered: serde_json::Value = serde_json::from_str(&format!(
        r#"{{"payload": {}, "signature": {}, "sender": {}}}"#,
        tx["payload"], tx["signature"], tx["sender"]
    ))
    .unwrap();
    let out = ExecutionOutput::failed(Status::RuntimeException, "x", None);
    assert_eq!(tx_hash(&tx, &out, None).unwrap(), tx_hash(&reordered, &out, None).unwrap());
    assert_eq!(h.run(&tx), h.run(&reordered));
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let kp = Keypair::generate();
    {
        let store: Arc<dyn KvStore> = Arc::new(FsKvStore::open(dir.path()).unwrap());
        let mut h = Harness::with_store(EngineConfig::default(), store);
        h.install("counter", COUNTER);
        assert_eq!(h.call(&kp, "counter", "set", &[("v", Value::Int(5))]).status, Status::Success);
    }
    let store: Arc<dyn KvStore> = Arc::new(FsKvStore::open(dir.path()).unwrap());
    let driver = StateDriver::new(store);
    assert_eq!(driver.get("counter.x").unwrap(), Some(Value::Int(5)));
    assert!(driver.contract_exists("submission").unwrap());
}

#[test]
fn test_unknown_argument_fails() {
    let mut h = Harness::new(EngineConfig::default());
    h.install("counter", COUNTER);
    let out = h.call(&Keypair::generate(), "counter", "set", &[("v", Value::Int(1)), ("w", Value::Int(2))]);
    assert_eq!(out.status, Status::RuntimeException);
    assert!(out.result.to_string().contains("unexpected argument w"));
}

/// Memory store whose reads or writes can be switched off.
#[derive(Default)]
struct FlakyStore {
    inner: MemKvStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    fn check(flag: &AtomicBool, what: &str) -> anyhow::Result<()> {
        if flag.load(Ordering::SeqCst) {
            anyhow::bail!("{} unavailable", what);
        }
        Ok(())
    }
}

impl KvStore for FlakyStore {
    fn name(&self) -> String {
        "flaky".into()
    }

    fn put(&self, key: &[u8], value: &[u8]) -> anyhow::Result<()> {
        Self::check(&self.fail_writes, "disk")?;
        self.inner.put(key, value)
    }

    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        Self::check(&self.fail_reads, "disk")?;
        self.inner.get(key)
    }

    fn delete(&self, key: &[u8]) -> anyhow::Result<()> {
        Self::check(&self.fail_writes, "disk")?;
        self.inner.delete(key)
    }

    fn write_batch(&self, batch: WriteBatch) -> anyhow::Result<()> {
        Self::check(&self.fail_writes, "disk")?;
        self.inner.write_batch(batch)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> anyhow::Result<KvIter> {
        Self::check(&self.fail_reads, "disk")?;
        self.inner.scan_prefix(prefix)
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.inner.clear()
    }

    fn path(&self) -> Option<PathBuf> {
        None
    }
}

#[test]
fn test_failed_commit_keeps_writes_for_the_next_tx() {
    let store = Arc::new(FlakyStore::default());
    let mut h = Harness::with_store(EngineConfig::default(), store.clone());
    h.install("counter", COUNTER);
    let kp = Keypair::generate();

    store.fail_writes.store(true, Ordering::SeqCst);
    let out = h.call(&kp, "counter", "set", &[("v", Value::Int(5))]);
    assert_eq!(out.status, Status::StorageFailure);
    assert!(out.result.to_string().contains("disk unavailable"));
    assert_eq!(store.inner.get(b"counter.x").unwrap(), None);

    store.fail_writes.store(false, Ordering::SeqCst);
    let out = h.call(&kp, "counter", "get", &[]);
    assert_eq!(out.status, Status::Success);
    assert_eq!(out.result, Value::Int(5));
    assert_eq!(store.inner.get(b"counter.x").unwrap(), Some(b"5".to_vec()));
}

#[test]
fn test_failed_read_is_a_storage_failure() {
    let store = Arc::new(FlakyStore::default());
    let mut h = Harness::with_store(EngineConfig::default(), store.clone());
    h.install("counter", COUNTER);
    let kp = Keypair::generate();
    assert_eq!(h.call(&kp, "counter", "set", &[("v", Value::Int(3))]).status, Status::Success);

    store.fail_reads.store(true, Ordering::SeqCst);
    let out = h.call(&kp, "counter", "get", &[]);
    assert_eq!(out.status, Status::StorageFailure);
    assert!(out.updates.is_empty());

    store.fail_reads.store(false, Ordering::SeqCst);
    let out = h.call(&kp, "counter", "get", &[]);
    assert_eq!(out.status, Status::Success);
    assert_eq!(out.result, Value::Int(3));
}
