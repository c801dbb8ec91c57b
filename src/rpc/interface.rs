//! Command dispatch over the engine, the state driver and (optionally) block storage.
//!
//! Requests are `{"command": <name>, "arguments": {..}}`. Lookups that miss answer
//! with a status sentinel instead of an error so clients can tell "absent" from
//! "broken".

use crate::codec::{from_json, to_json, Value};
use crate::compiler;
use crate::ledger::{Block, BlockStorage};
use crate::runtime::{make_finalized_tx, tx_hash, CompiledUnit, Engine, ExecutionOutput};
use crate::state::{make_key, StateDriver};
use crate::utils::METRICS;
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

pub const NO_CONTRACT: u8 = 1;
pub const NO_VARIABLE: u8 = 2;
pub const NO_TX: u8 = 3;

/// Largest `run_all` batch: positions are hashed as `u16`.
pub const MAX_BATCH_SIZE: usize = u16::MAX as usize + 1;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("unknown command {0}")]
    UnknownCommand(String),

    #[error("bad arguments: {0}")]
    BadArguments(String),

    #[error("block storage is not enabled")]
    BlocksDisabled,

    #[error("{0}")]
    Compile(#[from] compiler::CompileError),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("state worker is gone")]
    WorkerGone,
}

fn sentinel(status: u8) -> JsonValue {
    json!({ "status": status })
}

fn str_arg<'a>(args: &'a JsonMap<String, JsonValue>, name: &str) -> Result<&'a str, RpcError> {
    args.get(name)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| RpcError::BadArguments(format!("{} must be a string", name)))
}

fn u64_arg(args: &JsonMap<String, JsonValue>, name: &str) -> Result<u64, RpcError> {
    args.get(name)
        .and_then(JsonValue::as_u64)
        .ok_or_else(|| RpcError::BadArguments(format!("{} must be a non-negative integer", name)))
}

pub struct StateInterface {
    driver: StateDriver,
    engine: Engine,
    blocks: Option<Arc<dyn BlockStorage>>,
}

impl StateInterface {
    pub fn new(driver: StateDriver, engine: Engine, blocks: Option<Arc<dyn BlockStorage>>) -> Self {
        Self { driver, engine, blocks }
    }

    pub fn driver(&self) -> &StateDriver {
        &self.driver
    }

    pub fn blocks_enabled(&self) -> bool {
        self.blocks.is_some()
    }

    fn blocks(&self) -> Result<&Arc<dyn BlockStorage>, RpcError> {
        self.blocks.as_ref().ok_or(RpcError::BlocksDisabled)
    }

    pub fn ping(&self) -> JsonValue {
        json!({ "result": "ok" })
    }

    pub fn get_contract(&self, name: &str) -> Result<JsonValue, RpcError> {
        match self.driver.get_contract(name)? {
            Some(code) => Ok(JsonValue::String(code)),
            None => {
                debug!(%name, "contract not found");
                Ok(sentinel(NO_CONTRACT))
            }
        }
    }

    fn unit(&self, name: &str) -> Result<Option<CompiledUnit>, RpcError> {
        match self.driver.get_compiled(name)? {
            Some(bytes) => Ok(Some(CompiledUnit::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Read one state entry; `key` parts follow the variable name.
    pub fn get_var(&self, contract: &str, variable: &str, key: &[Value]) -> Result<JsonValue, RpcError> {
        if !self.driver.contract_exists(contract)? {
            return Ok(sentinel(NO_CONTRACT));
        }
        let k = make_key(contract, variable, key).map_err(|e| RpcError::BadArguments(e.to_string()))?;
        match self.driver.get(&k)? {
            Some(v) => Ok(to_json(&v)),
            None => Ok(sentinel(NO_VARIABLE)),
        }
    }

    /// Names of the contract's own variables and hashes.
    pub fn get_vars(&self, contract: &str) -> Result<JsonValue, RpcError> {
        let unit = match self.unit(contract)? {
            Some(u) => u,
            None => return Ok(sentinel(NO_CONTRACT)),
        };
        let names: Vec<&str> = unit
            .variables
            .iter()
            .map(String::as_str)
            .chain(unit.hashes.iter().map(|h| h.name.as_str()))
            .collect();
        Ok(json!(names))
    }

    /// Exported functions with their parameter names.
    pub fn get_methods(&self, contract: &str) -> Result<JsonValue, RpcError> {
        let unit = match self.unit(contract)? {
            Some(u) => u,
            None => return Ok(sentinel(NO_CONTRACT)),
        };
        let methods: Vec<JsonValue> = unit
            .exported()
            .map(|f| json!({ "name": f.name, "arguments": f.params }))
            .collect();
        Ok(JsonValue::Array(methods))
    }

    fn finalize(&self, input: &JsonValue, output: &ExecutionOutput, position: usize) -> Result<JsonValue, RpcError> {
        let hash = match &self.blocks {
            Some(blocks) => {
                let prev = blocks.latest_hash()?;
                let index = u16::try_from(position)
                    .map_err(|_| RpcError::BadArguments(format!("batch position {} out of range", position)))?;
                tx_hash(input, output, Some((&prev, index)))
            }
            None => tx_hash(input, output, None),
        }
        .map_err(RpcError::BadArguments)?;
        Ok(make_finalized_tx(input, output, Some(hash)))
    }

    fn seal(&mut self, finalized: Vec<JsonValue>) -> Result<Block, RpcError> {
        let block = self.blocks()?.store_txs(finalized)?;
        self.driver.set_height(block.index as i64);
        self.driver.set_latest_hash(&block.hash);
        self.driver.commit()?;
        self.driver.clear_pending();
        METRICS.set_gauge("block_height", block.index as f64);
        Ok(block)
    }

    /// Execute one transaction. With blocks enabled the finalized transaction is
    /// sealed into a block of its own and the block is returned.
    pub fn run(&mut self, tx: JsonValue) -> Result<JsonValue, RpcError> {
        let output = self.engine.run(&mut self.driver, &tx, false);
        let mut input = tx;
        if let Some(obj) = input.as_object_mut() {
            obj.insert("index".to_string(), JsonValue::from(0u64));
        }
        let finalized = self.finalize(&input, &output, 0)?;
        if self.blocks.is_none() {
            return Ok(finalized);
        }
        let block = self.seal(vec![finalized])?;
        Ok(serde_json::to_value(block)?)
    }

    /// Execute a batch in order; one block for the whole batch when blocks are enabled.
    pub fn run_all(&mut self, txs: Vec<JsonValue>) -> Result<JsonValue, RpcError> {
        if txs.len() > MAX_BATCH_SIZE {
            return Err(RpcError::BadArguments(format!(
                "batch of {} transactions exceeds {}",
                txs.len(),
                MAX_BATCH_SIZE
            )));
        }
        let executed = self.engine.run_all(&mut self.driver, &txs);
        let finalized = executed
            .iter()
            .enumerate()
            .map(|(i, (input, output))| self.finalize(input, output, i))
            .collect::<Result<Vec<_>, _>>()?;
        if self.blocks.is_none() {
            return Ok(JsonValue::Array(finalized));
        }
        let block = self.seal(finalized)?;
        Ok(serde_json::to_value(block)?)
    }

    /// Counters and gauges of this process.
    pub fn metrics(&self) -> JsonValue {
        let (counters, gauges) = METRICS.snapshot();
        json!({ "counters": counters, "gauges": gauges })
    }

    pub fn lint(&self, code: &str) -> JsonValue {
        json!(compiler::lint(code))
    }

    /// Compile to hex bytecode.
    pub fn compile(&self, name: &str, code: &str) -> Result<JsonValue, RpcError> {
        let unit = compiler::compile(name, code)?;
        Ok(JsonValue::String(hex::encode(unit.to_bytes()?)))
    }

    pub fn get_block_by_hash(&self, hash: &str) -> Result<JsonValue, RpcError> {
        Ok(serde_json::to_value(self.blocks()?.get_block_by_hash(hash)?)?)
    }

    pub fn get_block_by_index(&self, index: u64) -> Result<JsonValue, RpcError> {
        Ok(serde_json::to_value(self.blocks()?.get_block_by_index(index)?)?)
    }

    pub fn get_tx(&self, hash: &str) -> Result<JsonValue, RpcError> {
        match self.blocks()?.get_transaction_by_hash(hash)? {
            Some(tx) => Ok(tx),
            None => Ok(sentinel(NO_TX)),
        }
    }

    pub fn dispatch(&mut self, command: &str, arguments: &JsonValue) -> Result<JsonValue, RpcError> {
        let empty = JsonMap::new();
        let args = match arguments {
            JsonValue::Object(map) => map,
            JsonValue::Null => &empty,
            _ => return Err(RpcError::BadArguments("arguments must be an object".into())),
        };
        match command {
            "ping" => Ok(self.ping()),
            "metrics" => Ok(self.metrics()),
            "get_contract" => self.get_contract(str_arg(args, "name")?),
            "get_var" => {
                let key = match args.get("key") {
                    None | Some(JsonValue::Null) => Vec::new(),
                    Some(JsonValue::Array(parts)) => parts
                        .iter()
                        .map(from_json)
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|e| RpcError::BadArguments(e.to_string()))?,
                    Some(part) => vec![from_json(part).map_err(|e| RpcError::BadArguments(e.to_string()))?],
                };
                self.get_var(str_arg(args, "contract")?, str_arg(args, "variable")?, &key)
            }
            "get_vars" => self.get_vars(str_arg(args, "contract")?),
            "get_methods" => self.get_methods(str_arg(args, "contract")?),
            "run" => {
                let tx = args
                    .get("transaction")
                    .cloned()
                    .ok_or_else(|| RpcError::BadArguments("transaction is required".into()))?;
                self.run(tx)
            }
            "run_all" => match args.get("transactions") {
                Some(JsonValue::Array(txs)) => self.run_all(txs.clone()),
                _ => Err(RpcError::BadArguments("transactions must be a list".into())),
            },
            "lint" => Ok(self.lint(str_arg(args, "code")?)),
            "compile" => {
                let name = args.get("name").and_then(JsonValue::as_str).unwrap_or("contract");
                self.compile(name, str_arg(args, "code")?)
            }
            "get_block_by_hash" => self.get_block_by_hash(str_arg(args, "hash")?),
            "get_block_by_index" => self.get_block_by_index(u64_arg(args, "index")?),
            "get_tx" => self.get_tx(str_arg(args, "hash")?),
            "block_height" => Ok(json!(self.blocks()?.height()?)),
            "block_hash" => Ok(json!(self.blocks()?.latest_hash()?)),
            other => Err(RpcError::UnknownCommand(other.to_string())),
        }
    }

    /// Handle a raw `{command, arguments}` request; errors become `{"error": ..}`.
    pub fn process(&mut self, request: &JsonValue) -> JsonValue {
        let command = match request.get("command").and_then(JsonValue::as_str) {
            Some(c) => c.to_string(),
            None => return json!({ "error": "command is required" }),
        };
        let arguments = request.get("arguments").cloned().unwrap_or(JsonValue::Null);
        match self.dispatch(&command, &arguments) {
            Ok(v) => v,
            Err(e) => {
                error!(%command, error = %e, "command failed");
                json!({ "error": e.to_string() })
            }
        }
    }

    /// Reset the backing store and every cache above it.
    pub fn flush(&mut self) -> Result<(), RpcError> {
        self.driver.flush()?;
        self.engine.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::ledger::KvBlockStore;
    use crate::runtime::{install_submission, make_tx, CallArgs, EngineConfig};
    use crate::storage::MemKvStore;

    const COUNTER: &str = "var x;\nhash seen = 0;\nexport fn set(v) { x.set(v); }\nexport fn get() { return x.get(); }\nfn helper() { return 1; }";

    fn interface(blocks: bool) -> StateInterface {
        let mut driver = StateDriver::new(Arc::new(MemKvStore::new()));
        install_submission(&mut driver).unwrap();
        let blocks: Option<Arc<dyn BlockStorage>> =
            blocks.then(|| Arc::new(KvBlockStore::new(Arc::new(MemKvStore::new()))) as Arc<dyn BlockStorage>);
        StateInterface::new(driver, Engine::new(EngineConfig::default()), blocks)
    }

    fn submit(iface: &mut StateInterface, kp: &Keypair) {
        let mut args = CallArgs::new();
        args.insert("name".into(), Value::str("counter"));
        args.insert("code".into(), Value::str(COUNTER));
        let tx = make_tx(kp, "submission", "submit_contract", &args, None, None);
        iface.dispatch("run", &json!({ "transaction": tx })).unwrap();
    }

    #[test]
    fn test_sentinels() {
        let mut iface = interface(false);
        assert_eq!(iface.dispatch("get_contract", &json!({"name": "nope"})).unwrap(), json!({"status": 1}));
        assert_eq!(iface.dispatch("get_vars", &json!({"contract": "nope"})).unwrap(), json!({"status": 1}));
        assert_eq!(
            iface.dispatch("get_var", &json!({"contract": "nope", "variable": "x"})).unwrap(),
            json!({"status": 1})
        );
        submit(&mut iface, &Keypair::generate());
        assert_eq!(
            iface.dispatch("get_var", &json!({"contract": "counter", "variable": "x"})).unwrap(),
            json!({"status": 2})
        );
    }

    #[test]
    fn test_introspection() {
        let mut iface = interface(false);
        submit(&mut iface, &Keypair::generate());
        assert_eq!(iface.dispatch("get_contract", &json!({"name": "counter"})).unwrap(), json!(COUNTER));
        assert_eq!(iface.dispatch("get_vars", &json!({"contract": "counter"})).unwrap(), json!(["x", "seen"]));
        assert_eq!(
            iface.dispatch("get_methods", &json!({"contract": "counter"})).unwrap(),
            json!([{"name": "set", "arguments": ["v"]}, {"name": "get", "arguments": []}])
        );
    }

    #[test]
    fn test_run_without_blocks_returns_finalized_tx() {
        let mut iface = interface(false);
        let kp = Keypair::generate();
        submit(&mut iface, &kp);
        let mut args = CallArgs::new();
        args.insert("v".into(), Value::Int(7));
        let tx = make_tx(&kp, "counter", "set", &args, None, None);
        let out = iface.dispatch("run", &json!({ "transaction": tx })).unwrap();
        assert_eq!(out["output"]["status"], json!(0));
        assert_eq!(out["input"]["index"], json!(0));
        assert_eq!(out["hash"].as_str().map(str::len), Some(64));
        assert_eq!(
            iface.dispatch("get_var", &json!({"contract": "counter", "variable": "x"})).unwrap(),
            json!(7)
        );
    }

    #[test]
    fn test_run_all_with_blocks_seals_one_block() {
        let mut iface = interface(true);
        let kp = Keypair::generate();
        submit(&mut iface, &kp);
        assert_eq!(iface.dispatch("block_height", &JsonValue::Null).unwrap(), json!(0));

        let txs: Vec<JsonValue> = (1..=2)
            .map(|v| {
                let mut args = CallArgs::new();
                args.insert("v".into(), Value::Int(v));
                make_tx(&kp, "counter", "set", &args, None, None)
            })
            .collect();
        let block = iface.dispatch("run_all", &json!({ "transactions": txs })).unwrap();
        assert_eq!(block["index"], json!(1));
        assert_eq!(block["transactions"].as_array().map(Vec::len), Some(2));
        assert_eq!(iface.driver().height().unwrap(), 1);
        assert_eq!(iface.dispatch("block_hash", &JsonValue::Null).unwrap(), block["hash"]);

        let tx_hash = block["transactions"][1]["hash"].as_str().unwrap().to_string();
        let fetched = iface.dispatch("get_tx", &json!({ "hash": tx_hash })).unwrap();
        assert_eq!(fetched["input"]["index"], json!(1));
        assert_eq!(iface.dispatch("get_tx", &json!({"hash": "00"})).unwrap(), json!({"status": 3}));
        assert_eq!(iface.dispatch("get_block_by_index", &json!({"index": 1})).unwrap(), block);
    }

    #[test]
    fn test_errors() {
        let mut iface = interface(false);
        assert!(matches!(iface.dispatch("nope", &JsonValue::Null), Err(RpcError::UnknownCommand(_))));
        assert!(matches!(iface.dispatch("get_contract", &json!({})), Err(RpcError::BadArguments(_))));
        assert!(matches!(iface.dispatch("block_height", &JsonValue::Null), Err(RpcError::BlocksDisabled)));
        assert!(matches!(iface.dispatch("compile", &json!({"code": "var;"})), Err(RpcError::Compile(_))));
        assert!(iface.process(&json!({"arguments": {}}))["error"].is_string());
        assert_eq!(iface.process(&json!({"command": "ping"})), json!({"result": "ok"}));
        assert!(iface.dispatch("metrics", &JsonValue::Null).unwrap()["counters"].is_object());
    }

    #[test]
    fn test_oversized_batch_is_refused_before_execution() {
        let mut iface = interface(true);
        let kp = Keypair::generate();
        submit(&mut iface, &kp);
        let mut args = CallArgs::new();
        args.insert("v".into(), Value::Int(9));
        let tx = make_tx(&kp, "counter", "set", &args, None, None);
        let txs = vec![tx; MAX_BATCH_SIZE + 1];

        let err = iface.dispatch("run_all", &json!({ "transactions": txs })).unwrap_err();
        assert!(matches!(err, RpcError::BadArguments(_)));
        assert_eq!(
            iface.dispatch("get_var", &json!({"contract": "counter", "variable": "x"})).unwrap(),
            json!({"status": 2})
        );
        assert_eq!(iface.dispatch("block_height", &JsonValue::Null).unwrap(), json!(0));
    }

    #[test]
    fn test_deeply_nested_source_is_a_lint_error() {
        let mut iface = interface(false);
        let code = format!("export fn f() {{ return {}1{}; }}", "(".repeat(100_000), ")".repeat(100_000));
        let violations = iface.dispatch("lint", &json!({ "code": code })).unwrap();
        assert_eq!(violations.as_array().map(Vec::len), Some(1));
        assert!(matches!(iface.dispatch("compile", &json!({ "code": code })), Err(RpcError::Compile(_))));
    }

    #[test]
    fn test_flush_forgets_contracts() {
        let mut iface = interface(false);
        submit(&mut iface, &Keypair::generate());
        iface.flush().unwrap();
        assert_eq!(iface.dispatch("get_contract", &json!({"name": "counter"})).unwrap(), json!({"status": 1}));
        assert_eq!(iface.driver().height().unwrap(), -1);
    }

    #[test]
    fn test_lint_and_compile() {
        let mut iface = interface(false);
        assert_eq!(iface.dispatch("lint", &json!({"code": COUNTER})).unwrap(), json!([]));
        let bad = iface.dispatch("lint", &json!({"code": "export fn f() { return y; }"})).unwrap();
        assert!(!bad.as_array().unwrap().is_empty());
        let hex_code = iface.dispatch("compile", &json!({"code": COUNTER, "name": "counter"})).unwrap();
        let unit = CompiledUnit::from_bytes(&hex::decode(hex_code.as_str().unwrap()).unwrap()).unwrap();
        assert_eq!(unit.name, "counter");
    }
}
