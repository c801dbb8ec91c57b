use thiserror::Error;

/// Process-level errors: what can stop the node from starting.
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias
pub type Result<T> = std::result::Result<T, BlockchainError>;
