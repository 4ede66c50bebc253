//! Delay line error types
//!
//! Only lifecycle operations report errors. Per-frame failures (encode or
//! decode) are logged and surface as dropped frames or `None` from lookups.

use thiserror::Error;

/// Errors that can occur while bringing a delay line up
#[derive(Error, Debug)]
pub enum DelayLineError {
    /// The background compression thread could not be started
    #[error("Failed to spawn compression worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

/// Result type for delay line lifecycle operations
pub type DelayLineResult<T> = Result<T, DelayLineError>;
