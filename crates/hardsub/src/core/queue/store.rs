//! Queue state: the ordered job list and the encoding settings jobs run with.
//!
//! Plain data with no locking or I/O; the processor wraps it in a mutex.

use std::path::PathBuf;

use super::{JobDescriptor, JobStatus, QueueItem, QueueStats};
use crate::core::ffmpeg::{BurnProgress, LogCategory};
use crate::core::settings::{EncodingSettings, EncodingSettingsPatch};
use crate::core::{CoreError, CoreResult, JobId};

#[derive(Debug, Default)]
pub struct QueueStore {
    items: Vec<QueueItem>,
    settings: EncodingSettings,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(mut settings: EncodingSettings) -> Self {
        settings.normalize();
        Self {
            items: Vec::new(),
            settings,
        }
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Append a pending job
    pub fn add_item(&mut self, descriptor: JobDescriptor) -> JobId {
        let item = QueueItem::new(descriptor);
        let id = item.id.clone();
        self.items.push(item);
        id
    }

    /// Append pending jobs in order
    pub fn add_items(
        &mut self,
        descriptors: impl IntoIterator<Item = JobDescriptor>,
    ) -> Vec<JobId> {
        descriptors
            .into_iter()
            .map(|descriptor| self.add_item(descriptor))
            .collect()
    }

    /// Remove a job. The job being processed cannot be removed.
    pub fn remove_item(&mut self, id: &str) -> CoreResult<QueueItem> {
        let index = self.index_of(id)?;
        if self.items[index].status == JobStatus::Processing {
            return Err(CoreError::ItemActive(id.to_string()));
        }
        Ok(self.items.remove(index))
    }

    /// Drop every job except the one being processed. Returns how many went.
    pub fn clear_queue(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|item| item.status == JobStatus::Processing);
        before - self.items.len()
    }

    /// Move the pending job at `from` to position `to`.
    ///
    /// Out-of-range indices, non-pending jobs and moves onto the job being
    /// processed leave the queue untouched and return false.
    pub fn reorder_item(&mut self, from: usize, to: usize) -> bool {
        let len = self.items.len();
        if from >= len || to >= len || from == to {
            return false;
        }
        if self.items[from].status != JobStatus::Pending
            || self.items[to].status == JobStatus::Processing
        {
            return false;
        }

        let item = self.items.remove(from);
        self.items.insert(to, item);
        true
    }

    /// Re-queue a finished job as a fresh pending job at the end
    pub fn retry_item(&mut self, id: &str) -> CoreResult<JobId> {
        let index = self.index_of(id)?;
        let item = &self.items[index];
        if !item.status.is_terminal() {
            return Err(CoreError::InvalidCommand(format!(
                "Only finished jobs can be retried: {}",
                id
            )));
        }
        let descriptor = item.descriptor.clone();
        Ok(self.add_item(descriptor))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn get_item(&self, id: &str) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats::from_items(&self.items)
    }

    pub fn processing_item(&self) -> Option<&QueueItem> {
        self.items
            .iter()
            .find(|item| item.status == JobStatus::Processing)
    }

    pub fn settings(&self) -> &EncodingSettings {
        &self.settings
    }

    pub fn update_settings(&mut self, patch: &EncodingSettingsPatch) -> &EncodingSettings {
        self.settings.apply(patch);
        &self.settings
    }

    pub fn replace_settings(&mut self, mut settings: EncodingSettings) -> &EncodingSettings {
        settings.normalize();
        self.settings = settings;
        &self.settings
    }

    fn index_of(&self, id: &str) -> CoreResult<usize> {
        self.items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| CoreError::ItemNotFound(id.to_string()))
    }

    fn item_mut(&mut self, id: &str) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    // =========================================================================
    // Lifecycle (driven by the processor)
    // =========================================================================

    /// Mark the first pending job as processing and hand back a snapshot of it
    /// together with the settings it runs with.
    ///
    /// Returns `None` when nothing is pending or a job is already processing.
    pub fn begin_next(&mut self) -> Option<(QueueItem, EncodingSettings)> {
        if self.processing_item().is_some() {
            return None;
        }

        let item = self
            .items
            .iter_mut()
            .find(|item| item.status == JobStatus::Pending)?;
        item.status = JobStatus::Processing;
        item.progress = None;
        item.error = None;
        Some((item.clone(), self.settings.clone()))
    }

    pub fn set_progress(&mut self, id: &str, progress: BurnProgress) -> bool {
        match self.item_mut(id) {
            Some(item) if item.status == JobStatus::Processing => {
                item.progress = Some(progress);
                true
            }
            _ => false,
        }
    }

    pub fn push_log(&mut self, id: &str, line: impl Into<String>, category: LogCategory) {
        if let Some(item) = self.item_mut(id) {
            item.push_log(line, category);
        }
    }

    pub fn complete(&mut self, id: &str, output_path: PathBuf) -> bool {
        self.finish(id, JobStatus::Completed, None, Some(output_path))
    }

    pub fn fail(&mut self, id: &str, message: String) -> bool {
        self.finish(id, JobStatus::Error, Some(message), None)
    }

    pub fn cancel(&mut self, id: &str) -> bool {
        self.finish(id, JobStatus::Cancelled, None, None)
    }

    /// Terminal transitions only happen from processing.
    fn finish(
        &mut self,
        id: &str,
        status: JobStatus,
        error: Option<String>,
        output_path: Option<PathBuf>,
    ) -> bool {
        let Some(item) = self.item_mut(id) else {
            return false;
        };
        if item.status != JobStatus::Processing {
            return false;
        }

        item.status = status;
        item.progress = None;
        item.error = error;
        item.resolved_output_path = output_path;
        item.finished_at = Some(chrono::Utc::now().to_rfc3339());
        true
    }
}
