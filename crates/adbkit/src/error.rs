use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by adbkit.
///
/// Remote failures (a device that went away, a command that printed garbage)
/// never show up here: the executor returns text and callers degrade to
/// empty or zero values. These variants cover local faults and policy
/// refusals that the caller has to act on.
#[derive(Debug, Error)]
pub enum Error {
    /// No device is attached in the `device` state
    #[error("no device connected")]
    Disconnected,

    /// Path is under a restricted system prefix and system access is off
    #[error(
        "system directories are restricted: {0} (enable system access to browse this folder)"
    )]
    Restricted(String),

    /// The adb executable could not be started at all
    #[error("adb not found at {}", .0.display())]
    ToolNotFound(PathBuf),

    /// Invalid path provided
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Another pull or stream is already running in this transfer slot
    #[error("a transfer is already in progress")]
    Busy,

    /// adb reported a failed pull, or the local file never appeared
    #[error("pull failed for {remote}: {reason}")]
    PullFailed {
        /// Remote path that was requested
        remote: String,
        /// Output line that explains the failure
        reason: String,
    },

    /// A background adb process could not be started
    #[error("failed to start {program}: {message}")]
    Spawn {
        /// Program that failed to start
        program: PathBuf,
        /// Underlying OS error
        message: String,
    },

    /// The external viewer could not be launched
    #[error("failed to open viewer: {0}")]
    Viewer(String),

    /// IO error in the local scratch cache
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if the same call can succeed when simply retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Busy | Error::Disconnected)
    }
}

/// Result type for adbkit operations
pub type Result<T> = std::result::Result<T, Error>;
