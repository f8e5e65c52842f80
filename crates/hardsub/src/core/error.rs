//! Hardsub Error Definitions
//!
//! Defines error types used throughout the project.

use thiserror::Error;

use super::{ffmpeg::FFmpegError, JobId};

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Encoder Errors
    // =========================================================================
    #[error(transparent)]
    FFmpeg(#[from] FFmpegError),

    // =========================================================================
    // Queue Errors
    // =========================================================================
    #[error("Queue item not found: {0}")]
    ItemNotFound(JobId),

    #[error("Queue item is still active: {0}")]
    ItemActive(JobId),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    // =========================================================================
    // Settings Errors
    // =========================================================================
    #[error("Settings error: {0}")]
    Settings(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Convert to a user-friendly error message for IPC
    pub fn to_ipc_error(&self) -> String {
        self.to_string()
    }
}
