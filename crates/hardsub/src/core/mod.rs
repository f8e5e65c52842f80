//! Hardsub Core Engine
//!
//! Job execution core: a single FFmpeg invocation, the job queue that feeds it,
//! and the settings every invocation reads.

pub mod ffmpeg;
pub mod process;
pub mod queue;
pub mod settings;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
