//! Node module: configuration, process wiring and the command line.

pub mod cli;
pub mod config;
pub mod node;
pub mod service_handle;

pub use cli::run_cli;
pub use config::NodeConfig;
pub use node::{open_interface, Node};
pub use service_handle::ServiceHandle;
