//! Ledger module: block storage for finalized transactions.
//!
//! Blocks are optional: without them, finalized transactions are returned to the
//! caller and it is up to whoever stores them to chain the hashes.

pub mod blockstore;

pub use blockstore::{block_hash, Block, BlockStorage, KvBlockStore};
