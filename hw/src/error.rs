//! Editor error types

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from window loading, editing and persistence
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("The file {} is not accessible: {source}", .path.display())]
    FileNotAccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot read file from offset {start} (file size {file_size})")]
    InvalidRange { start: u64, file_size: u64 },

    #[error("Range {offset}+{len} is outside the loaded window ({window_len} bytes)")]
    OutOfRange { offset: u64, len: u64, window_len: u64 },

    #[error("Window of {len} bytes does not fit in memory")]
    WindowTooLarge { len: u64 },

    #[error("Window is still loading")]
    LoadInProgress,

    #[error("Load was cancelled")]
    LoadCancelled,

    #[error("Load failed: {0}")]
    LoadFailed(String),

    #[error("No file is loaded")]
    NotLoaded,

    #[error("Failed to persist {}: {source}", .path.display())]
    PersistenceFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No pattern matcher configured")]
    NoPatternMatcher,

    #[error("Invalid patterns file {}: {message}", .path.display())]
    PatternFile { path: PathBuf, message: String },
}

impl EditorError {
    pub(crate) fn not_accessible(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileNotAccessible {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::PersistenceFailure {
            path: path.into(),
            source,
        }
    }

    /// Check if the operation can succeed once the in-flight load finishes
    pub fn is_load_in_progress(&self) -> bool {
        matches!(self, EditorError::LoadInProgress)
    }
}

/// Result alias for editor operations
pub type Result<T> = std::result::Result<T, EditorError>;
