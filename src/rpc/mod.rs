//! RPC module
//!
//! - `interface`: command dispatch over engine, state and block storage
//! - `worker`: single-owner actor serving commands from a queue
//! - `server`: newline-delimited JSON relay over TCP

pub mod interface;
pub mod server;
pub mod worker;

pub use interface::{RpcError, StateInterface, NO_CONTRACT, NO_TX, NO_VARIABLE};
pub use server::RpcServer;
pub use worker::Mailbox;
