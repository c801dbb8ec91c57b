//! Runtime module: executes contracts and whole transactions.
//!
//! Exposes:
//! - Engine: structural/signature checks, execution, rollback, settlement, commit.
//! - ModuleLoader: resolves contract names to cached compiled units.
//! - Vm: the sandboxed stack interpreter (with the builtin whitelist in `stdlib`).
//! - Meter: stamp accounting against a versioned cost schedule.
//! - ContextStack: signer / caller / this.

pub mod bytecode;
pub mod context;
pub mod executor;
pub mod metering;
pub mod program_loader;
pub mod runtime_types;
pub mod stdlib;
pub mod transaction;
pub mod vm;

pub use bytecode::CompiledUnit;
pub use context::{ContextStack, Environment};
pub use executor::{install_submission, tx_hash, Engine, EngineConfig, RollbackPolicy};
pub use metering::{CostSchedule, Meter};
pub use program_loader::ModuleLoader;
pub use runtime_types::{CallArgs, VmError};
pub use transaction::{make_finalized_tx, make_tx, ExecutionOutput, Status, Transaction};
pub use vm::{Vm, MAX_CALL_DEPTH, SUBMISSION_CONTRACT};
