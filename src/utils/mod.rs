//! Utility module: errors, logging, metrics.

pub mod errors;
pub mod metrics;
pub mod logging;

pub use errors::{BlockchainError, Result};
pub use metrics::{MetricsRegistry, METRICS};
pub use logging::init_logging;
