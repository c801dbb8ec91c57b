//! Transaction and execution-output model.
//!
//! Transactions arrive as raw JSON: the exact key set is part of validity, so
//! the engine checks the raw object before turning it into a `Transaction`.

use crate::codec::{encode, from_json, to_json, Value};
use crate::crypto::{Keypair, Signer};
use crate::runtime::runtime_types::CallArgs;
use crate::runtime::runtime_types::VmError;
use crate::state::PendingSet;
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    MalformedTx,
    InvalidSignature,
    RuntimeException,
    InsufficientStamps,
    OutOfStamps,
    StorageFailure,
}

impl Status {
    pub fn code(&self) -> u8 {
        match self {
            Status::Success => 0,
            Status::MalformedTx => 1,
            Status::InvalidSignature => 2,
            Status::RuntimeException => 3,
            Status::InsufficientStamps => 4,
            Status::OutOfStamps => 5,
            Status::StorageFailure => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Status::Success,
            1 => Status::MalformedTx,
            2 => Status::InvalidSignature,
            3 => Status::RuntimeException,
            4 => Status::InsufficientStamps,
            5 => Status::OutOfStamps,
            6 => Status::StorageFailure,
            _ => return None,
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::MalformedTx => "malformed_tx",
            Status::InvalidSignature => "invalid_signature",
            Status::RuntimeException => "runtime_exception",
            Status::InsufficientStamps => "insufficient_stamps",
            Status::OutOfStamps => "out_of_stamps",
            Status::StorageFailure => "storage_failure",
        }
    }
}

impl From<&VmError> for Status {
    fn from(e: &VmError) -> Self {
        match e {
            VmError::OutOfStamps { .. } => Status::OutOfStamps,
            VmError::Storage(_) => Status::StorageFailure,
            _ => Status::RuntimeException,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Structured result of one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    pub status: Status,
    pub result: Value,
    pub updates: PendingSet,
    /// stamps used; `None` when metering is off
    pub cost: Option<u64>,
}

impl ExecutionOutput {
    pub fn failed(status: Status, reason: impl Into<String>, cost: Option<u64>) -> Self {
        Self { status, result: Value::Str(reason.into()), updates: BTreeMap::new(), cost }
    }

    pub fn to_value(&self) -> Value {
        let mut out = BTreeMap::new();
        out.insert("status".to_string(), Value::Int(self.status.code() as i64));
        out.insert("result".to_string(), self.result.clone());
        let updates = self
            .updates
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().map(Value::Str).unwrap_or(Value::Null)))
            .collect();
        out.insert("updates".to_string(), Value::Map(updates));
        if let Some(cost) = self.cost {
            out.insert("cost".to_string(), Value::Int(cost as i64));
        }
        Value::Map(out)
    }

    pub fn to_json(&self) -> JsonValue {
        to_json(&self.to_value())
    }

    /// Canonical bytes, as used in transaction hashes.
    pub fn encode(&self) -> String {
        encode(&self.to_value())
    }
}

/// Parsed, structurally valid transaction payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub contract: String,
    pub function: String,
    pub arguments: CallArgs,
    pub stamps: Option<u64>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub sender: String,
    pub signature: String,
    pub payload: Payload,
    /// the raw payload, canonical-encoded: the signed message
    pub signed_bytes: String,
    pub index: Option<u64>,
}

/// Which optional payload fields the engine requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Schema {
    pub stamps: bool,
    pub timestamps: bool,
    pub batch: bool,
}

fn exact_keys(obj: &JsonMap<String, JsonValue>, expected: &[&str], what: &str) -> Result<(), String> {
    let mut missing: Vec<&str> = expected.iter().copied().filter(|k| !obj.contains_key(*k)).collect();
    let mut extra: Vec<&str> = obj.keys().map(String::as_str).filter(|k| !expected.contains(k)).collect();
    if missing.is_empty() && extra.is_empty() {
        return Ok(());
    }
    missing.sort_unstable();
    extra.sort_unstable();
    Err(format!("{} keys mismatch: missing {:?}, unexpected {:?}", what, missing, extra))
}

fn string_field(obj: &JsonMap<String, JsonValue>, key: &str) -> Result<String, String> {
    obj.get(key)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("{} must be a string", key))
}

/// Check the exact shape of a raw transaction and parse it.
pub fn verify_structure(raw: &JsonValue, schema: Schema) -> Result<Transaction, String> {
    let obj = raw.as_object().ok_or("transaction must be an object")?;
    let mut tx_keys = vec!["sender", "signature", "payload"];
    if schema.batch {
        tx_keys.push("index");
    }
    exact_keys(obj, &tx_keys, "transaction")?;

    let payload = obj
        .get("payload")
        .and_then(JsonValue::as_object)
        .ok_or("payload must be an object")?;
    let mut payload_keys = vec!["contract", "function", "arguments"];
    if schema.stamps {
        payload_keys.push("stamps");
    }
    if schema.timestamps {
        payload_keys.push("timestamp");
    }
    exact_keys(payload, &payload_keys, "payload")?;

    let index = match obj.get("index") {
        None => None,
        Some(v) => Some(v.as_u64().ok_or("index must be a non-negative integer")?),
    };

    let arguments = match payload.get("arguments").and_then(JsonValue::as_object) {
        Some(args) => {
            let mut out = CallArgs::new();
            for (k, v) in args {
                out.insert(k.clone(), from_json(v).map_err(|e| format!("argument {}: {}", k, e))?);
            }
            out
        }
        None => return Err("arguments must be an object".into()),
    };

    let stamps = match payload.get("stamps") {
        None => None,
        Some(v) => match v.as_u64() {
            Some(s) if s > 0 => Some(s),
            _ => return Err("stamps must be a positive integer".into()),
        },
    };
    let timestamp = match payload.get("timestamp") {
        None => None,
        Some(v) => Some(v.as_i64().ok_or("timestamp must be an integer")?),
    };

    let payload_value = from_json(&JsonValue::Object(payload.clone())).map_err(|e| e.to_string())?;

    Ok(Transaction {
        sender: string_field(obj, "sender")?,
        signature: string_field(obj, "signature")?,
        payload: Payload {
            contract: string_field(payload, "contract")?,
            function: string_field(payload, "function")?,
            arguments,
            stamps,
            timestamp,
        },
        signed_bytes: encode(&payload_value),
        index,
    })
}

/// Build and sign a transaction the way clients do.
pub fn make_tx(
    keypair: &Keypair,
    contract: &str,
    function: &str,
    arguments: &CallArgs,
    stamps: Option<u64>,
    timestamp: Option<i64>,
) -> JsonValue {
    let mut payload = BTreeMap::new();
    payload.insert("contract".to_string(), Value::str(contract));
    payload.insert("function".to_string(), Value::str(function));
    payload.insert("arguments".to_string(), Value::Map(arguments.clone()));
    if let Some(s) = stamps {
        payload.insert("stamps".to_string(), Value::Int(s as i64));
    }
    if let Some(t) = timestamp {
        payload.insert("timestamp".to_string(), Value::Int(t));
    }
    let payload = Value::Map(payload);
    let signature = keypair.sign(encode(&payload).as_bytes());
    json!({
        "sender": keypair.public_hex(),
        "signature": signature.to_hex(),
        "payload": to_json(&payload),
    })
}

/// `{input, output, hash}`
pub fn make_finalized_tx(input: &JsonValue, output: &ExecutionOutput, hash: Option<String>) -> JsonValue {
    let mut out = JsonMap::new();
    out.insert("input".to_string(), input.clone());
    out.insert("output".to_string(), output.to_json());
    if let Some(h) = hash {
        out.insert("hash".to_string(), JsonValue::String(h));
    }
    JsonValue::Object(out)
}
