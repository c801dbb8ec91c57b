//! Transaction engine.
//!
//! RECEIVED -> structure check -> signature check -> stamp pre-check -> execute
//! -> (rollback per policy) -> settle stamps -> extract updates -> commit.
//! `run` never panics and never returns `Err`: every failure is an `ExecutionOutput`.

use crate::codec::Value;
use crate::compiler::compile;
use crate::crypto::{sha3_256, verify_hex};
use crate::runtime::context::Environment;
use crate::runtime::metering::{self, CostSchedule, Meter, STAMPS_PER_UNIT};
use crate::runtime::program_loader::ModuleLoader;
use crate::runtime::transaction::{self, ExecutionOutput, Schema, Status, Transaction};
use crate::runtime::vm::{Vm, SUBMISSION_CONTRACT};
use crate::state::{make_key, StateDriver};
use crate::utils::metrics::METRICS;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

/// What happens to a failed transaction's writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// revert every write made by the failed execution
    #[default]
    Discard,
    /// keep writes made before the failure point
    RetainPartial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// charge stamps and require `payload.stamps`
    pub metering: bool,
    /// require `payload.timestamp`, exposed through `now()`
    pub timestamps: bool,
    pub rollback: RollbackPolicy,
    pub currency_contract: String,
    pub balances_hash: String,
    pub stamps_per_unit: u64,
    /// instruction budget applied when metering is off
    pub unmetered_budget: u64,
    pub cost_schedule: CostSchedule,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            metering: false,
            timestamps: false,
            rollback: RollbackPolicy::Discard,
            currency_contract: "currency".to_string(),
            balances_hash: "balances".to_string(),
            stamps_per_unit: STAMPS_PER_UNIT,
            unmetered_budget: 10_000_000,
            cost_schedule: CostSchedule::default(),
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    loader: ModuleLoader,
    meter: Meter,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let meter = Meter::new(config.cost_schedule);
        Self { config, loader: ModuleLoader::new(), meter }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn loader_mut(&mut self) -> &mut ModuleLoader {
        &mut self.loader
    }

    fn schema(&self, batch: bool) -> Schema {
        Schema { stamps: self.config.metering, timestamps: self.config.timestamps, batch }
    }

    fn cost(&self, used: u64) -> Option<u64> {
        self.config.metering.then_some(used)
    }

    pub fn verify_tx_structure(&self, raw: &JsonValue, part_of_batch: bool) -> Result<Transaction, String> {
        transaction::verify_structure(raw, self.schema(part_of_batch))
    }

    pub fn verify_tx_signature(tx: &Transaction) -> bool {
        verify_hex(&tx.sender, &tx.signature, tx.signed_bytes.as_bytes())
    }

    fn balance_key(&self, sender: &str) -> Result<String, String> {
        make_key(&self.config.currency_contract, &self.config.balances_hash, &[Value::str(sender)])
            .map_err(|e| e.to_string())
    }

    /// Execute one transaction. The environment is derived from the transaction.
    pub fn run(&mut self, driver: &mut StateDriver, raw: &JsonValue, part_of_batch: bool) -> ExecutionOutput {
        let output = self.execute(driver, raw, part_of_batch);
        METRICS.record_tx(output.status, output.cost.unwrap_or(0));
        output
    }

    fn execute(&mut self, driver: &mut StateDriver, raw: &JsonValue, part_of_batch: bool) -> ExecutionOutput {
        driver.clear_pending();

        let tx = match self.verify_tx_structure(raw, part_of_batch) {
            Ok(tx) => tx,
            Err(reason) => {
                debug!(%reason, "malformed transaction");
                return ExecutionOutput::failed(Status::MalformedTx, reason, self.cost(0));
            }
        };
        if !Self::verify_tx_signature(&tx) {
            debug!(sender = %tx.sender, "invalid signature");
            return ExecutionOutput::failed(Status::InvalidSignature, "invalid signature", self.cost(0));
        }

        let env = Environment {
            now: tx.payload.timestamp.map(Value::Int),
            seed: sha3_256(format!("{}{}", tx.signature, tx.signed_bytes).as_bytes()),
        };

        let (budget, balance_key) = if self.config.metering {
            let budget = tx.payload.stamps.unwrap_or(0);
            let key = match self.balance_key(&tx.sender) {
                Ok(k) => k,
                Err(e) => return ExecutionOutput::failed(Status::MalformedTx, e, self.cost(0)),
            };
            let balance = match metering::balance_of(driver, &key) {
                Ok(b) => b,
                Err(e) => return ExecutionOutput::failed(Status::StorageFailure, format!("{:#}", e), self.cost(0)),
            };
            if !metering::can_afford(&balance, self.config.stamps_per_unit, budget) {
                return ExecutionOutput::failed(
                    Status::InsufficientStamps,
                    format!("balance {} cannot cover {} stamps", balance, budget),
                    self.cost(0),
                );
            }
            (budget, Some(key))
        } else {
            (self.config.unmetered_budget, None)
        };

        let checkpoint = driver.checkpoint();
        self.meter.begin(budget);
        let result = {
            let mut vm = Vm::new(driver, &mut self.loader, &mut self.meter, &env, &tx.sender);
            vm.call(&tx.payload.contract, &tx.payload.function, tx.payload.arguments.clone())
        };
        let used = self.meter.used();

        let (mut status, mut result) = match result {
            Ok(v) => (Status::Success, v),
            Err(e) => {
                let status = Status::from(&e);
                debug!(contract = %tx.payload.contract, function = %tx.payload.function, error = %e, "execution failed");
                if self.config.rollback == RollbackPolicy::Discard {
                    driver.revert(checkpoint.clone());
                    self.loader.clear();
                }
                (status, Value::Str(e.to_string()))
            }
        };

        if let Some(key) = &balance_key {
            // execution may have spent the funds that pay for it
            if let Ok(balance) = metering::balance_of(driver, key) {
                if !metering::can_afford(&balance, self.config.stamps_per_unit, used) {
                    debug!(sender = %tx.sender, %balance, used, "balance drained during execution");
                    driver.revert(checkpoint);
                    self.loader.clear();
                    status = Status::InsufficientStamps;
                    result = Value::Str(format!("balance {} cannot cover {} stamps used", balance, used));
                }
            }
            if let Err(e) = metering::settle(driver, key, self.config.stamps_per_unit, used) {
                warn!(error = %e, "stamp settlement failed");
                status = Status::StorageFailure;
                result = Value::Str(format!("{:#}", e));
            }
        }

        let updates = driver.take_pending();
        if let Err(e) = driver.commit() {
            warn!(error = %e, "state commit failed");
            status = Status::StorageFailure;
            result = Value::Str(format!("{:#}", e));
        }

        ExecutionOutput { status, result, updates, cost: self.cost(used) }
    }

    /// Execute in order; each transaction gets `index` from its position and sees
    /// the writes of the ones before it.
    pub fn run_all(&mut self, driver: &mut StateDriver, txs: &[JsonValue]) -> Vec<(JsonValue, ExecutionOutput)> {
        let mut out = Vec::with_capacity(txs.len());
        for (i, tx) in txs.iter().enumerate() {
            let mut tx = tx.clone();
            if let Some(obj) = tx.as_object_mut() {
                obj.insert("index".to_string(), JsonValue::from(i as u64));
            }
            let output = self.run(driver, &tx, true);
            out.push((tx, output));
        }
        info!(count = txs.len(), "batch executed");
        out
    }

    /// Drop cached modules; used after the backing store is reset.
    pub fn reset(&mut self) {
        self.loader.clear();
    }
}

pub const SUBMISSION_SOURCE: &str = include_str!("../contracts/submission.sc");

/// Store the submission contract if it is missing. Returns whether it was installed.
pub fn install_submission(driver: &mut StateDriver) -> anyhow::Result<bool> {
    if driver.contract_exists(SUBMISSION_CONTRACT)? {
        return Ok(false);
    }
    let unit = compile(SUBMISSION_CONTRACT, SUBMISSION_SOURCE).map_err(|e| anyhow::anyhow!("{}", e))?;
    driver.set_contract(SUBMISSION_CONTRACT, SUBMISSION_SOURCE, &unit.to_bytes()?, None, "sys");
    driver.commit()?;
    info!("submission contract installed");
    Ok(true)
}

/// Transaction hash. With block storage the previous block hash and the position
/// in the batch are mixed in so identical transactions still hash apart.
pub fn tx_hash(input: &JsonValue, output: &ExecutionOutput, chained: Option<(&str, u16)>) -> Result<String, String> {
    let input = crate::codec::from_json(input).map_err(|e| e.to_string())?;
    let mut bytes = Vec::new();
    if let Some((prev_hash, index)) = chained {
        bytes.extend(hex::decode(prev_hash).map_err(|e| format!("bad block hash: {}", e))?);
        bytes.extend(index.to_be_bytes());
    }
    bytes.extend(crate::codec::encode(&input).into_bytes());
    bytes.extend(output.encode().into_bytes());
    Ok(hex::encode(sha3_256(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::runtime::runtime_types::CallArgs;
    use crate::runtime::transaction::make_tx;
    use crate::storage::MemKvStore;
    use std::sync::Arc;

    const COUNTER: &str = "var x;\nexport fn set(v) { x.set(v); }\nexport fn get() { return x.get(); }\nexport fn boom() { x.set(99); assert false, 'boom'; }";

    fn setup(config: EngineConfig) -> (Engine, StateDriver) {
        let mut driver = StateDriver::new(Arc::new(MemKvStore::new()));
        let unit = crate::compiler::compile("counter", COUNTER).unwrap();
        driver.set_contract("counter", COUNTER, &unit.to_bytes().unwrap(), None, "test");
        driver.commit().unwrap();
        (Engine::new(config), driver)
    }

    fn args(pairs: &[(&str, Value)]) -> CallArgs {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_set_then_get() {
        let (mut engine, mut driver) = setup(EngineConfig::default());
        let kp = Keypair::generate();
        let out = engine.run(&mut driver, &make_tx(&kp, "counter", "set", &args(&[("v", Value::Int(5))]), None, None), false);
        assert_eq!(out.status, Status::Success);
        assert_eq!(out.updates.get("counter.x"), Some(&Some("5".to_string())));
        assert_eq!(out.cost, None);

        let out = engine.run(&mut driver, &make_tx(&kp, "counter", "get", &CallArgs::new(), None, None), false);
        assert_eq!(out.result, Value::Int(5));
        assert!(out.updates.is_empty());
        assert!(driver.get_pending().is_empty());
    }

    #[test]
    fn test_failure_discards_by_default() {
        let (mut engine, mut driver) = setup(EngineConfig::default());
        let kp = Keypair::generate();
        let out = engine.run(&mut driver, &make_tx(&kp, "counter", "boom", &CallArgs::new(), None, None), false);
        assert_eq!(out.status, Status::RuntimeException);
        assert_eq!(out.result, Value::str("assertion failed: boom"));
        assert!(out.updates.is_empty());
        assert_eq!(driver.get("counter.x").unwrap(), None);
    }

    #[test]
    fn test_failure_retains_partial_when_configured() {
        let config = EngineConfig { rollback: RollbackPolicy::RetainPartial, ..EngineConfig::default() };
        let (mut engine, mut driver) = setup(config);
        let kp = Keypair::generate();
        let out = engine.run(&mut driver, &make_tx(&kp, "counter", "boom", &CallArgs::new(), None, None), false);
        assert_eq!(out.status, Status::RuntimeException);
        assert_eq!(out.updates.get("counter.x"), Some(&Some("99".to_string())));
        assert_eq!(driver.get("counter.x").unwrap(), Some(Value::Int(99)));
    }

    #[test]
    fn test_bad_signature_does_not_execute() {
        let (mut engine, mut driver) = setup(EngineConfig::default());
        let kp = Keypair::generate();
        let mut tx = make_tx(&kp, "counter", "set", &args(&[("v", Value::Int(1))]), None, None);
        tx["payload"]["arguments"]["v"] = serde_json::json!(2);
        let out = engine.run(&mut driver, &tx, false);
        assert_eq!(out.status, Status::InvalidSignature);
        assert!(out.updates.is_empty());
        assert_eq!(driver.get("counter.x").unwrap(), None);
    }

    #[test]
    fn test_tx_hash_depends_on_position() {
        let kp = Keypair::generate();
        let tx = make_tx(&kp, "counter", "get", &CallArgs::new(), None, None);
        let out = ExecutionOutput::failed(Status::MalformedTx, "x", None);
        let zero = "0".repeat(64);
        let a = tx_hash(&tx, &out, Some((&zero, 0))).unwrap();
        let b = tx_hash(&tx, &out, Some((&zero, 1))).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, tx_hash(&tx, &out, Some((&zero, 0))).unwrap());
        assert_ne!(a, tx_hash(&tx, &out, None).unwrap());
    }
}
