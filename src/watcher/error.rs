//! Error types for the file state watcher.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
///
/// File state transitions (modified, truncated, deleted) are never errors;
/// they travel through [`ChangeSignals`](super::ChangeSignals). Only
/// subsystem failures and unexpected OS errors end up here.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stat file {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("event source closed")]
    EventSourceClosed,

    #[error("Watch task failed: {reason}")]
    TaskFailed { reason: String },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
