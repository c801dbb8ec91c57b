//! Common runtime types: the VM error taxonomy and call arguments.

use crate::codec::{Value, ValueError};
use crate::state::KeyError;
use std::collections::BTreeMap;
use thiserror::Error;

/// Named call arguments.
pub type CallArgs = BTreeMap<String, Value>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VmError {
    #[error("Module {0} not found")]
    ModuleNotFound(String),

    #[error("function {function} not found in {contract}")]
    FunctionNotFound { contract: String, function: String },

    #[error("function {function} of {contract} is not exported")]
    NotExported { contract: String, function: String },

    #[error("restricted: {0}")]
    Restricted(String),

    #[error("caller is not the owner of {0}")]
    NotOwner(String),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("bad arguments: {0}")]
    BadArguments(String),

    #[error("out of stamps: used {used} of {budget}")]
    OutOfStamps { used: u64, budget: u64 },

    #[error("value too large: {bytes} bytes, nested {depth} deep")]
    ValueTooLarge { bytes: usize, depth: usize },

    #[error("maximum call depth {0} exceeded")]
    CallDepth(usize),

    #[error("invalid bytecode: {0}")]
    InvalidBytecode(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("compile failed: {0}")]
    Compile(String),

    #[error("contract {0} already exists")]
    ContractExists(String),
}

impl VmError {
    pub fn storage(e: anyhow::Error) -> Self {
        VmError::Storage(format!("{:#}", e))
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        VmError::Value(ValueError::Type(msg.into()))
    }
}
