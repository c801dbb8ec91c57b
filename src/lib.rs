//! stampchain: deterministic smart-contract execution over a buffered key-value
//! state store, metered in stamps.
//!
//! - `codec`: value model and canonical encoding
//! - `storage`: backing key-value stores
//! - `state`: state driver (write cache, pending set, contract storage)
//! - `compiler`: contract language to bytecode
//! - `runtime`: sandboxed VM, metering and the transaction engine
//! - `ledger`: optional block storage for finalized transactions
//! - `rpc`: command dispatch, state worker, line relay
//! - `node`: configuration, wiring and CLI

pub mod codec;
pub mod compiler;
pub mod crypto;
pub mod ledger;
pub mod node;
pub mod rpc;
pub mod runtime;
pub mod state;
pub mod storage;
pub mod utils;
