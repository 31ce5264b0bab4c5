//! Error types for the playback engine and session manager

use thiserror::Error;

/// Result type for core playback operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while running playback or managing sessions
#[derive(Error, Debug)]
pub enum CoreError {
    /// Dataset layer error
    #[error("dataset error: {source}")]
    Dataset {
        #[from]
        /// Source dataset error
        source: neurastream_dataset::DatasetError,
    },

    /// Session code was not recognized
    #[error("unknown session: {session_code}")]
    UnknownSession {
        /// Session code that was requested
        session_code: String,
    },

    /// Session could not be deleted because connections are still attached
    #[error("cannot delete session {session_code}: {active_connections} active connection(s)")]
    SessionBusy {
        /// Session code
        session_code: String,
        /// Number of connections still attached
        active_connections: u32,
    },
}

impl CoreError {
    /// Create an unknown-session error
    pub fn unknown_session(session_code: impl Into<String>) -> Self {
        Self::UnknownSession {
            session_code: session_code.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::unknown_session("swift-neural-42");
        assert!(format!("{err}").contains("swift-neural-42"));

        let err = CoreError::SessionBusy {
            session_code: "prime-cortex-7".into(),
            active_connections: 2,
        };
        assert!(format!("{err}").contains("2 active"));
    }
}
