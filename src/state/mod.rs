//! State module: the buffered view of contract state every execution goes through.
//!
//! - `StateDriver`: read-your-writes cache + per-transaction pending set over a `KvStore`
//! - `keys`: `contract.variable[:part...]` key builder

pub mod driver;
pub mod keys;

pub use driver::{Checkpoint, PendingSet, StateDriver};
pub use keys::{make_key, KeyError};
