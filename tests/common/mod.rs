#![allow(dead_code)]

use serde_json::Value as JsonValue;
use stampchain::codec::Value;
use stampchain::compiler::compile;
use stampchain::crypto::Keypair;
use stampchain::runtime::{install_submission, make_tx, CallArgs, Engine, EngineConfig, ExecutionOutput};
use stampchain::state::StateDriver;
use stampchain::storage::{KvStore, MemKvStore};
use std::sync::Arc;

pub const COUNTER: &str = r#"
var x;

export fn set(v) { x.set(v); }
export fn get() { return x.get(); }
export fn incr() { x.set(x.get() + 1); return x.get(); }
export fn who() { return [ctx.signer, ctx.caller, ctx.this]; }
export fn boom() { x.set(99); assert false, "boom"; }
export fn spin(n) {
    let i = 0;
    while i < n { i = i + 1; }
    return i;
}
"#;

pub fn args(pairs: &[(&str, Value)]) -> CallArgs {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

pub struct Harness {
    pub engine: Engine,
    pub driver: StateDriver,
    pub stamps: Option<u64>,
    pub timestamp: Option<i64>,
}

impl Harness {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_store(config, Arc::new(MemKvStore::new()))
    }

    pub fn with_store(config: EngineConfig, store: Arc<dyn KvStore>) -> Self {
        let mut driver = StateDriver::new(store);
        install_submission(&mut driver).unwrap();
        let stamps = config.metering.then_some(100_000);
        let timestamp = config.timestamps.then_some(1_700_000_000);
        Self { engine: Engine::new(config), driver, stamps, timestamp }
    }

    /// Store a contract directly, bypassing the submission contract.
    pub fn install(&mut self, name: &str, source: &str) {
        let unit = compile(name, source).unwrap();
        self.driver.set_contract(name, source, &unit.to_bytes().unwrap(), None, "test");
        self.driver.commit().unwrap();
    }

    pub fn tx(&self, kp: &Keypair, contract: &str, function: &str, pairs: &[(&str, Value)]) -> JsonValue {
        make_tx(kp, contract, function, &args(pairs), self.stamps, self.timestamp)
    }

    pub fn run(&mut self, tx: &JsonValue) -> ExecutionOutput {
        self.engine.run(&mut self.driver, tx, false)
    }

    pub fn call(&mut self, kp: &Keypair, contract: &str, function: &str, pairs: &[(&str, Value)]) -> ExecutionOutput {
        let tx = self.tx(kp, contract, function, pairs);
        self.run(&tx)
    }

    pub fn submit(
        &mut self,
        kp: &Keypair,
        name: &str,
        code: &str,
        owner: Option<&str>,
        constructor_args: Option<CallArgs>,
    ) -> ExecutionOutput {
        let mut pairs = vec![("name", Value::str(name)), ("code", Value::str(code))];
        if let Some(owner) = owner {
            pairs.push(("owner", Value::str(owner)));
        }
        if let Some(ctor) = constructor_args {
            pairs.push(("constructor_args", Value::Map(ctor)));
        }
        self.call(kp, "submission", "submit_contract", &pairs)
    }
}
