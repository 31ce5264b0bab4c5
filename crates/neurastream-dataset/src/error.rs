//! Error types for the dataset layer

use thiserror::Error;

/// Result type for dataset operations
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Errors that can occur while opening or reading a dataset
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Dataset file does not exist or cannot be opened
    #[error("dataset not found: {path}")]
    NotFound {
        /// Path that was probed
        path: String,
    },

    /// Dataset file exists but its contents are inconsistent
    #[error("malformed dataset: {reason}")]
    Malformed {
        /// Description of what was wrong
        reason: String,
    },

    /// Underlying I/O failure while reading the dataset
    #[error("dataset I/O error: {source}")]
    Io {
        #[from]
        /// Underlying error
        source: std::io::Error,
    },

    /// A query referenced a trial, channel, or target that does not exist
    #[error("unknown {kind} {id}")]
    NotPresent {
        /// Kind of entity that was missing (`"trial"`, `"channel"`, `"target"`)
        kind: &'static str,
        /// Identifier that was requested
        id: u32,
    },
}

impl DatasetError {
    /// Create a not-found error
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a malformed-dataset error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DatasetError::not_found("data/raw/mc_maze.nsds");
        assert!(format!("{err}").contains("mc_maze.nsds"));

        let err = DatasetError::NotPresent {
            kind: "trial",
            id: 42,
        };
        assert!(format!("{err}").contains("trial 42"));
    }
}
