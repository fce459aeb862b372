//! Error type shared by the psjungle library.

use std::time::Duration;

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid PID '{0}'")]
    InvalidPid(String),

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid signal '{0}'")]
    InvalidSignal(String),

    #[error("no target specified")]
    NoTargets,

    #[error("No processes found")]
    NoProcessesFound,

    #[error("target process {0} not found")]
    TargetNotFound(u32),

    #[error("process scan exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid snapshot data: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for errors that should end the whole invocation, including watch
    /// mode. Snapshot failures only end the current cycle.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Error::DeadlineExceeded(_) | Error::Io(_) | Error::TargetNotFound(_)
        )
    }
}
