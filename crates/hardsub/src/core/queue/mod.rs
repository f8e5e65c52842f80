//! Job Queue Module
//!
//! Ordered burn jobs, their lifecycle, and the processor that runs them one
//! at a time.

mod scheduler;
mod store;

pub use scheduler::{QueueProcessor, SchedulerState};
pub use store::QueueStore;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::ffmpeg::{BurnProgress, LogCategory};
use crate::core::{new_job_id, JobId};

/// Per-job log lines kept; older lines are dropped first
pub const MAX_LOG_LINES: usize = 500;

/// Job lifecycle status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    /// Completed, error and cancelled jobs never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }
}

/// What to burn: the caller-supplied part of a job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    pub video_path: PathBuf,
    #[serde(default)]
    pub video_name: String,
    pub subtitle_path: PathBuf,
    #[serde(default)]
    pub subtitle_name: String,
    pub output_path: PathBuf,
}

impl JobDescriptor {
    pub fn new(
        video_path: impl Into<PathBuf>,
        subtitle_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        let mut descriptor = Self {
            video_path: video_path.into(),
            video_name: String::new(),
            subtitle_path: subtitle_path.into(),
            subtitle_name: String::new(),
            output_path: output_path.into(),
        };
        descriptor.fill_names();
        descriptor
    }

    /// Derive display names from the paths where none were given
    pub fn fill_names(&mut self) {
        if self.video_name.is_empty() {
            self.video_name = display_name(&self.video_path);
        }
        if self.subtitle_name.is_empty() {
            self.subtitle_name = display_name(&self.subtitle_path);
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// A log line attached to a job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub line: String,
    pub category: LogCategory,
}

/// One burn job
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: JobId,
    #[serde(flatten)]
    pub descriptor: JobDescriptor,
    pub status: JobStatus,
    /// Present only while processing
    pub progress: Option<BurnProgress>,
    pub logs: VecDeque<LogLine>,
    /// Failure message, set only in the error state
    pub error: Option<String>,
    /// Where the encoder actually wrote the output, set on completion
    #[serde(default)]
    pub resolved_output_path: Option<PathBuf>,
    /// Created timestamp (RFC 3339)
    pub created_at: String,
    /// Set when the job reaches a terminal state
    pub finished_at: Option<String>,
}

impl QueueItem {
    pub fn new(mut descriptor: JobDescriptor) -> Self {
        descriptor.fill_names();
        Self {
            id: new_job_id(),
            descriptor,
            status: JobStatus::Pending,
            progress: None,
            logs: VecDeque::new(),
            error: None,
            resolved_output_path: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
        }
    }

    pub fn push_log(&mut self, line: impl Into<String>, category: LogCategory) {
        if self.logs.len() >= MAX_LOG_LINES {
            self.logs.pop_front();
        }
        self.logs.push_back(LogLine {
            line: line.into(),
            category,
        });
    }
}

/// Job counts by status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
    pub cancelled: usize,
}

impl QueueStats {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a QueueItem>) -> Self {
        let mut stats = Self::default();
        for item in items {
            stats.total += 1;
            match item.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Error => stats.error += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}
