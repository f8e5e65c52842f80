//! Hardsub Core Library
//!
//! Burns ASS subtitles into video files with FFmpeg, one job at a time, from
//! an ordered queue.
//!
//! - [`core::ffmpeg`] runs a single burn and reports its progress
//! - [`core::queue`] holds the jobs and drives them sequentially
//! - [`core::settings`] persists the encoding settings jobs run with
//! - [`ipc`] is the JSON command and event surface for a frontend

pub mod core;
pub mod ipc;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Default directory for rolling log files
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hardsub")
        .join("logs")
}

/// Install the global tracing subscriber.
///
/// Console output goes to stderr so stdout stays free for machine-readable
/// output. With a `log_dir`, a daily rolling file is written as well. Safe to
/// call more than once; only the first call takes effect.
pub fn init_logging(log_dir: Option<&Path>) {
    use tracing_subscriber::prelude::*;

    let file_layer = log_dir.and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Could not create log directory {}: {}", dir.display(), e);
            return None;
        }

        let file_appender = tracing_appender::rolling::daily(dir, "hardsub.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
    });

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);

    // Already initialized (tests, embedding applications).
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        init_logging(Some(dir.path()));
        init_logging(None);
        tracing::info!("logging initialized");
        assert!(dir.path().exists());
    }

    #[test]
    fn test_default_log_dir() {
        assert!(default_log_dir().ends_with("hardsub/logs"));
    }
}
