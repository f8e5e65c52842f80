//! FFmpeg Integration Module
//!
//! Runs exactly one subtitle burn through an external FFmpeg process:
//! - Argument construction from the job and encoding settings
//! - Parsing of FFmpeg's diagnostic stream into progress and log events
//! - Detection of the FFmpeg executable and of hardware encoders
//! - Process lifecycle (spawn, cancel, exit handling)

mod args;
mod detection;
mod parser;
mod runner;

pub use args::{
    build_burn_args, build_filter_chain, escape_subtitle_path, resolve_output_path,
    validate_path_for_ffmpeg, BurnRequest, MAX_PATH_LENGTH,
};
pub use detection::{
    check_availability, check_availability_with_timeout, detect_hardware_encoder,
    detect_system_ffmpeg, EncoderAvailability, FFmpegInfo, AVAILABILITY_TIMEOUT, FFMPEG_ENV_VAR,
};
pub use parser::{
    categorize_log_line, format_eta, is_progress_noise, parse_duration_line, parse_progress_line,
    parse_timestamp, BurnProgress, LineSplitter, LogCategory, ProgressSample, ProgressTracker,
};
pub use runner::{BurnOutcome, Burner, FFmpegBurner, InvocationEvent, InvocationEvents};

use std::fmt;
use std::path::PathBuf;

/// Which input of a burn job is meant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Video,
    Subtitle,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "Video"),
            Self::Subtitle => write!(f, "Subtitle"),
        }
    }
}

/// FFmpeg-related error types
#[derive(Debug, thiserror::Error)]
pub enum FFmpegError {
    #[error("FFmpeg not found. Install FFmpeg or point {} at the executable.", FFMPEG_ENV_VAR)]
    NotFound,

    #[error("A process is already running")]
    AlreadyRunning,

    #[error("{kind} file not found: {}", .path.display())]
    InputNotFound { kind: InputKind, path: PathBuf },

    #[error("Failed to start FFmpeg: {0}")]
    SpawnFailed(String),

    #[error("Process exited with code {code}")]
    NonZeroExit { code: i32 },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Process error: {0}")]
    ProcessError(#[from] std::io::Error),
}

pub type FFmpegResult<T> = Result<T, FFmpegError>;
