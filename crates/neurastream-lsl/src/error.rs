//! Error types for the side-channel publisher

use thiserror::Error;

/// Result type for side-channel publisher operations
pub type Result<T> = std::result::Result<T, LslError>;

/// Errors that can occur while initializing the side-channel publisher
#[derive(Error, Debug)]
pub enum LslError {
    /// This build was compiled without the `lsl` feature
    #[error("LSL support was not compiled into this build")]
    Unavailable,

    /// The outlet's background worker thread failed to start
    #[error("failed to start LSL outlet worker: {reason}")]
    WorkerStartup {
        /// Underlying failure description
        reason: String,
    },
}
