//! Queue processor
//!
//! Pulls pending jobs one at a time and runs them through a [`Burner`].
//! Pausing takes effect at the next job boundary; the running burn is only
//! interrupted by an explicit cancel. Every state change is published through
//! an [`EventSink`].

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use super::{JobDescriptor, QueueItem, QueueStats, QueueStore};
use crate::core::ffmpeg::{
    BurnOutcome, BurnRequest, Burner, EncoderAvailability, FFmpegResult, InvocationEvent,
    LogCategory,
};
use crate::core::settings::{EncodingSettings, EncodingSettingsPatch};
use crate::core::{CoreResult, JobId};
use crate::ipc::events::{EventSink, QueueEvent};

/// Processor run state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    #[default]
    Idle,
    Running,
    Paused,
}

#[derive(Debug, Default)]
struct Control {
    state: SchedulerState,
    /// A pull loop task exists
    loop_active: bool,
    /// Cancel arrived after the job was claimed but before its burn started
    cancel_requested: bool,
}

enum Step {
    Run(Box<QueueItem>, EncodingSettings),
    Drained,
    Stopped,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs queued jobs sequentially. Always used behind an `Arc`.
pub struct QueueProcessor {
    // Lock order: control before store.
    control: Mutex<Control>,
    store: Mutex<QueueStore>,
    burner: Arc<dyn Burner>,
    events: Arc<dyn EventSink>,
    idle: Notify,
    cancel_signal: Notify,
}

impl QueueProcessor {
    pub fn new(burner: Arc<dyn Burner>, events: Arc<dyn EventSink>) -> Arc<Self> {
        Self::with_settings(burner, events, EncodingSettings::default())
    }

    pub fn with_settings(
        burner: Arc<dyn Burner>,
        events: Arc<dyn EventSink>,
        settings: EncodingSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            control: Mutex::new(Control::default()),
            store: Mutex::new(QueueStore::with_settings(settings)),
            burner,
            events,
            idle: Notify::new(),
            cancel_signal: Notify::new(),
        })
    }

    fn store(&self) -> MutexGuard<'_, QueueStore> {
        lock(&self.store)
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        lock(&self.control)
    }

    fn publish_queue(&self) {
        let items = self.store().items().to_vec();
        self.events.emit(QueueEvent::QueueUpdated { items });
    }

    fn publish_item(&self, id: &str) {
        let item = self.store().get_item(id).cloned();
        if let Some(item) = item {
            self.events.emit(QueueEvent::ItemUpdated { item });
        }
    }

    // =========================================================================
    // Queue Operations
    // =========================================================================

    pub fn add_item(&self, descriptor: JobDescriptor) -> JobId {
        let id = self.store().add_item(descriptor);
        debug!(job_id = %id, "Job added");
        self.publish_queue();
        id
    }

    pub fn add_items(&self, descriptors: Vec<JobDescriptor>) -> Vec<JobId> {
        let ids = self.store().add_items(descriptors);
        info!("Added {} job(s) to the queue", ids.len());
        self.publish_queue();
        ids
    }

    pub fn remove_item(&self, id: &str) -> CoreResult<()> {
        self.store().remove_item(id)?;
        debug!(job_id = %id, "Job removed");
        self.publish_queue();
        Ok(())
    }

    pub fn clear_queue(&self) -> usize {
        let removed = self.store().clear_queue();
        info!("Cleared {} job(s) from the queue", removed);
        self.publish_queue();
        removed
    }

    pub fn reorder_item(&self, from: usize, to: usize) -> bool {
        let moved = self.store().reorder_item(from, to);
        if moved {
            self.publish_queue();
        } else {
            debug!(from, to, "Reorder ignored");
        }
        moved
    }

    /// Queue a fresh copy of a finished job
    pub fn retry(&self, id: &str) -> CoreResult<JobId> {
        let new_id = self.store().retry_item(id)?;
        info!(job_id = %id, new_job_id = %new_id, "Job re-queued");
        self.publish_queue();
        Ok(new_id)
    }

    pub fn get_queue(&self) -> Vec<QueueItem> {
        self.store().items().to_vec()
    }

    pub fn get_item(&self, id: &str) -> Option<QueueItem> {
        self.store().get_item(id).cloned()
    }

    pub fn get_stats(&self) -> QueueStats {
        self.store().stats()
    }

    pub fn settings(&self) -> EncodingSettings {
        self.store().settings().clone()
    }

    /// Merge a settings update. Jobs that already started keep their snapshot.
    pub fn update_settings(&self, patch: &EncodingSettingsPatch) -> EncodingSettings {
        let settings = self.store().update_settings(patch).clone();
        info!("Encoding settings updated: {}", settings.summary());
        settings
    }

    /// Swap in a complete settings value. Jobs that already started keep their snapshot.
    pub fn replace_settings(&self, settings: EncodingSettings) -> EncodingSettings {
        let settings = self.store().replace_settings(settings).clone();
        info!("Encoding settings replaced: {}", settings.summary());
        settings
    }

    pub async fn check_availability(&self) -> EncoderAvailability {
        self.burner.check_availability().await
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    pub fn state(&self) -> SchedulerState {
        self.control().state
    }

    /// Whether a job is being burned right now
    pub fn is_processing(&self) -> bool {
        self.store().processing_item().is_some()
    }

    /// Start pulling jobs. A no-op while already running.
    pub fn start(self: &Arc<Self>) {
        let spawn_loop = {
            let mut control = self.control();
            if control.state == SchedulerState::Running {
                return;
            }
            control.state = SchedulerState::Running;
            !std::mem::replace(&mut control.loop_active, true)
        };

        info!("Queue processing started");
        if spawn_loop {
            let processor = Arc::clone(self);
            tokio::spawn(async move { processor.run_loop().await });
        }
    }

    /// Stop after the current job. The running burn is not interrupted.
    pub fn pause(&self) {
        let mut control = self.control();
        if control.state == SchedulerState::Running {
            control.state = SchedulerState::Paused;
            info!("Queue paused; the current job will finish");
        }
    }

    /// Continue after a pause. Behaves like `start` when idle.
    pub fn resume(self: &Arc<Self>) {
        self.start();
    }

    /// Cancel the job being processed, if any.
    ///
    /// A job that is claimed but whose burn has not started yet is cancelled
    /// as soon as the burn starts.
    pub fn cancel_current(&self) -> bool {
        let mut control = self.control();
        if self.burner.cancel() {
            info!("Cancel requested for the current job");
            return true;
        }
        if self.store().processing_item().is_none() {
            return false;
        }

        control.cancel_requested = true;
        drop(control);
        self.cancel_signal.notify_one();
        info!("Cancel requested before the current burn started");
        true
    }

    fn take_cancel_request(&self) -> bool {
        std::mem::take(&mut self.control().cancel_requested)
    }

    /// Wait until no pull loop is active
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if !self.control().loop_active {
                return;
            }
            notified.await;
        }
    }

    async fn run_loop(self: Arc<Self>) {
        debug!("Queue loop started");
        loop {
            match self.next_step() {
                Step::Run(item, settings) => self.run_job(*item, settings).await,
                Step::Drained => {
                    info!("Queue finished: {:?}", self.get_stats());
                    self.publish_queue();
                    self.events.emit(QueueEvent::QueueCompleted);
                    if self.try_exit() {
                        break;
                    }
                }
                Step::Stopped => {
                    if self.try_exit() {
                        info!("Queue loop stopped while paused");
                        break;
                    }
                }
            }
        }
        debug!("Queue loop exited");
        self.idle.notify_waiters();
    }

    fn next_step(&self) -> Step {
        let mut control = self.control();
        if control.state != SchedulerState::Running {
            return Step::Stopped;
        }
        control.cancel_requested = false;
        match self.store().begin_next() {
            Some((item, settings)) => Step::Run(Box::new(item), settings),
            None => {
                control.state = SchedulerState::Idle;
                Step::Drained
            }
        }
    }

    /// Release the loop unless `start` ran again in the meantime.
    fn try_exit(&self) -> bool {
        let mut control = self.control();
        if control.state == SchedulerState::Running {
            return false;
        }
        control.loop_active = false;
        true
    }

    async fn run_job(&self, item: QueueItem, settings: EncodingSettings) {
        let job_id = item.id.clone();
        info!(job_id = %job_id, video = %item.descriptor.video_name, "Processing job");
        self.publish_item(&job_id);
        self.publish_queue();

        let request = BurnRequest::new(
            item.descriptor.video_path,
            item.descriptor.subtitle_path,
            item.descriptor.output_path,
            settings,
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let burn = self.burner.burn(request, tx);
        let cancel_signal = self.cancel_signal.notified();
        tokio::pin!(burn, cancel_signal);

        // The burn is polled before the cancel branch, so it already holds its
        // process slot when a deferred cancel is forwarded.
        let result = loop {
            tokio::select! {
                biased;
                Some(event) = rx.recv() => self.apply_invocation_event(&job_id, event),
                result = &mut burn => break result,
                _ = &mut cancel_signal => {
                    if self.take_cancel_request() {
                        debug!(job_id = %job_id, "Forwarding deferred cancel");
                        self.burner.cancel();
                    }
                    cancel_signal.set(self.cancel_signal.notified());
                }
            }
        };
        while let Ok(event) = rx.try_recv() {
            self.apply_invocation_event(&job_id, event);
        }

        self.finish_job(&job_id, result);
    }

    fn apply_invocation_event(&self, job_id: &str, event: InvocationEvent) {
        match event {
            InvocationEvent::Progress(progress) => {
                let updated = self.store().set_progress(job_id, progress.clone());
                if updated {
                    self.events.emit(QueueEvent::ItemProgress {
                        job_id: job_id.to_string(),
                        progress,
                    });
                    self.publish_item(job_id);
                    self.publish_queue();
                }
            }
            InvocationEvent::Log { line, category } => {
                self.store().push_log(job_id, line.clone(), category);
                self.events.emit(QueueEvent::ItemLog {
                    job_id: job_id.to_string(),
                    line,
                    category,
                });
            }
            // The burn's return value decides the job's final state.
            InvocationEvent::Completed { .. } | InvocationEvent::Failed { .. } => {}
        }
    }

    fn finish_job(&self, job_id: &str, result: FFmpegResult<BurnOutcome>) {
        match result {
            Ok(BurnOutcome::Completed { output_path }) => {
                self.store().complete(job_id, output_path.clone());
                info!(job_id = %job_id, output = %output_path.display(), "Job completed");
                self.publish_item(job_id);
                self.events.emit(QueueEvent::ItemCompleted {
                    job_id: job_id.to_string(),
                    output_path,
                });
            }
            Ok(BurnOutcome::Cancelled) => {
                {
                    let mut store = self.store();
                    store.push_log(job_id, "Job cancelled", LogCategory::Warning);
                    store.cancel(job_id);
                }
                warn!(job_id = %job_id, "Job cancelled");
                self.publish_item(job_id);
            }
            Err(e) => {
                let message = e.to_string();
                {
                    let mut store = self.store();
                    store.push_log(job_id, message.clone(), LogCategory::Error);
                    store.fail(job_id, message.clone());
                }
                error!(job_id = %job_id, "Job failed: {}", message);
                self.publish_item(job_id);
                self.events.emit(QueueEvent::ItemError {
                    job_id: job_id.to_string(),
                    message,
                });
            }
        }
        self.publish_queue();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ffmpeg::{BurnProgress, FFmpegError, InputKind, InvocationEvents};
    use crate::core::queue::JobStatus;
    use crate::ipc::events::ChannelEventSink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Scripted burner. The video file stem picks the behavior:
    /// `fail*` exits non-zero, `missing*` has no input file, `hold*` waits for
    /// the gate (or a cancel) before finishing.
    struct FakeBurner {
        started: Mutex<Vec<(String, String)>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        gate: Semaphore,
        cancelled: Notify,
    }

    impl FakeBurner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                started: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                gate: Semaphore::new(0),
                cancelled: Notify::new(),
            })
        }

        fn release(&self) {
            self.gate.add_permits(1);
        }

        fn started_names(&self) -> Vec<String> {
            self.started
                .lock()
                .unwrap()
                .iter()
                .map(|(name, _)| name.clone())
                .collect()
        }

        fn bitrates(&self) -> Vec<String> {
            self.started
                .lock()
                .unwrap()
                .iter()
                .map(|(_, bitrate)| bitrate.clone())
                .collect()
        }

        async fn script(
            &self,
            name: &str,
            request: &BurnRequest,
            events: &InvocationEvents,
        ) -> FFmpegResult<BurnOutcome> {
            if name.starts_with("missing") {
                return Err(FFmpegError::InputNotFound {
                    kind: InputKind::Video,
                    path: request.video_path.clone(),
                });
            }

            let _ = events.send(InvocationEvent::Log {
                line: format!("Starting {}", name),
                category: LogCategory::Info,
            });

            if name.starts_with("hold") {
                tokio::select! {
                    permit = self.gate.acquire() => permit.unwrap().forget(),
                    _ = self.cancelled.notified() => {
                        let _ = events.send(InvocationEvent::Log {
                            line: "Process was cancelled".into(),
                            category: LogCategory::Warning,
                        });
                        return Ok(BurnOutcome::Cancelled);
                    }
                }
            }

            for percentage in [25.0, 50.0, 100.0] {
                let _ = events.send(InvocationEvent::Progress(progress(percentage)));
                tokio::task::yield_now().await;
            }

            if name.starts_with("fail") {
                return Err(FFmpegError::NonZeroExit { code: 1 });
            }
            Ok(BurnOutcome::Completed {
                output_path: request.output_path.clone(),
            })
        }
    }

    #[async_trait]
    impl Burner for FakeBurner {
        async fn burn(
            &self,
            request: BurnRequest,
            events: InvocationEvents,
        ) -> FFmpegResult<BurnOutcome> {
            let name = request
                .video_path
                .file_stem()
                .unwrap()
                .to_string_lossy()
                .into_owned();
            self.started
                .lock()
                .unwrap()
                .push((name.clone(), request.settings.bitrate.clone()));

            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            let result = self.script(&name, &request, &events).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn cancel(&self) -> bool {
            if self.active.load(Ordering::SeqCst) == 0 {
                return false;
            }
            self.cancelled.notify_one();
            true
        }

        fn is_running(&self) -> bool {
            self.active.load(Ordering::SeqCst) > 0
        }
    }

    fn progress(percentage: f64) -> BurnProgress {
        BurnProgress {
            frame: (percentage * 10.0) as u64,
            fps: 24.0,
            time: "00:00:01.00".into(),
            bitrate: "1000.0kbits/s".into(),
            speed: "1.0x".into(),
            percentage,
            eta: None,
        }
    }

    fn job(name: &str) -> JobDescriptor {
        JobDescriptor::new(
            format!("/videos/{}.mkv", name),
            format!("/videos/{}.ass", name),
            format!("/out/{}.mp4", name),
        )
    }

    fn setup() -> (
        Arc<FakeBurner>,
        Arc<QueueProcessor>,
        mpsc::UnboundedReceiver<QueueEvent>,
    ) {
        let burner = FakeBurner::new();
        let (sink, rx) = ChannelEventSink::new();
        let processor = QueueProcessor::new(burner.clone(), Arc::new(sink));
        (burner, processor, rx)
    }

    async fn wait_idle(processor: &QueueProcessor) {
        tokio::time::timeout(Duration::from_secs(5), processor.wait_idle())
            .await
            .expect("queue should go idle");
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition should be reached");
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<QueueEvent>) -> Vec<QueueEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn status_of(processor: &QueueProcessor, id: &str) -> JobStatus {
        processor.get_item(id).unwrap().status
    }

    fn count_completed_events(events: &[QueueEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, QueueEvent::QueueCompleted))
            .count()
    }

    #[tokio::test]
    async fn test_jobs_run_in_order() {
        let (burner, processor, mut rx) = setup();
        let ids = processor.add_items(vec![job("a"), job("b"), job("c")]);

        processor.start();
        wait_idle(&processor).await;

        assert_eq!(burner.started_names(), vec!["a", "b", "c"]);
        assert_eq!(burner.max_active.load(Ordering::SeqCst), 1);
        for id in &ids {
            let item = processor.get_item(id).unwrap();
            assert_eq!(item.status, JobStatus::Completed);
            assert!(item.progress.is_none());
            assert_eq!(
                item.resolved_output_path.as_ref(),
                Some(&item.descriptor.output_path)
            );
        }
        assert_eq!(processor.state(), SchedulerState::Idle);
        assert_eq!(processor.get_stats().completed, 3);

        let events = drain(&mut rx);
        assert_eq!(count_completed_events(&events), 1);
        assert!(matches!(events.last(), Some(QueueEvent::QueueCompleted)));
        let completed = events
            .iter()
            .filter(|e| matches!(e, QueueEvent::ItemCompleted { .. }))
            .count();
        assert_eq!(completed, 3);
    }

    #[tokio::test]
    async fn test_failed_job_does_not_stop_queue() {
        let (_burner, processor, mut rx) = setup();
        let ids = processor.add_items(vec![job("a"), job("fail_b"), job("c")]);

        processor.start();
        wait_idle(&processor).await;

        assert_eq!(status_of(&processor, &ids[0]), JobStatus::Completed);
        assert_eq!(status_of(&processor, &ids[2]), JobStatus::Completed);

        let failed = processor.get_item(&ids[1]).unwrap();
        assert_eq!(failed.status, JobStatus::Error);
        assert_eq!(failed.error.as_deref(), Some("Process exited with code 1"));
        assert!(failed
            .logs
            .iter()
            .any(|l| l.category == LogCategory::Error && l.line == "Process exited with code 1"));

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            QueueEvent::ItemError { job_id, message }
                if job_id == &ids[1] && message == "Process exited with code 1"
        )));
    }

    #[tokio::test]
    async fn test_missing_input_fails_without_progress() {
        let (_burner, processor, mut rx) = setup();
        let id = processor.add_item(job("missing"));

        processor.start();
        wait_idle(&processor).await;

        let item = processor.get_item(&id).unwrap();
        assert_eq!(item.status, JobStatus::Error);
        assert!(item.error.unwrap().contains("Video file not found"));

        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e, QueueEvent::ItemProgress { .. })));
    }

    #[tokio::test]
    async fn test_pause_waits_for_job_boundary() {
        let (burner, processor, mut rx) = setup();
        let ids = processor.add_items(vec![job("hold_a"), job("b")]);

        processor.start();
        wait_until(|| burner.is_running()).await;

        processor.pause();
        assert_eq!(processor.state(), SchedulerState::Paused);
        // The running job is not interrupted.
        assert_eq!(status_of(&processor, &ids[0]), JobStatus::Processing);

        burner.release();
        wait_idle(&processor).await;

        assert_eq!(status_of(&processor, &ids[0]), JobStatus::Completed);
        assert_eq!(status_of(&processor, &ids[1]), JobStatus::Pending);
        assert_eq!(burner.started_names(), vec!["hold_a"]);
        assert_eq!(count_completed_events(&drain(&mut rx)), 0);

        processor.resume();
        wait_idle(&processor).await;

        assert_eq!(status_of(&processor, &ids[1]), JobStatus::Completed);
        assert_eq!(count_completed_events(&drain(&mut rx)), 1);
    }

    #[tokio::test]
    async fn test_cancel_current_moves_on() {
        let (burner, processor, _rx) = setup();
        let ids = processor.add_items(vec![job("hold_a"), job("b")]);

        assert!(!processor.cancel_current());

        processor.start();
        wait_until(|| burner.is_running()).await;
        assert!(processor.cancel_current());
        wait_idle(&processor).await;

        let cancelled = processor.get_item(&ids[0]).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.error.is_none());
        assert!(cancelled
            .logs
            .iter()
            .any(|l| l.category == LogCategory::Warning && l.line.contains("cancelled")));
        assert_eq!(status_of(&processor, &ids[1]), JobStatus::Completed);
    }

    /// Cancels the queue's current job the moment it is reported as
    /// processing, before the burner has been called.
    struct CancelOnClaimSink {
        processor: std::sync::OnceLock<std::sync::Weak<QueueProcessor>>,
        result: Mutex<Option<bool>>,
    }

    impl EventSink for CancelOnClaimSink {
        fn emit(&self, event: QueueEvent) {
            let QueueEvent::ItemUpdated { item } = &event else {
                return;
            };
            if item.status != JobStatus::Processing {
                return;
            }
            let mut result = self.result.lock().unwrap();
            if result.is_none() {
                if let Some(processor) = self.processor.get().and_then(|p| p.upgrade()) {
                    *result = Some(processor.cancel_current());
                }
            }
        }
    }

    #[tokio::test]
    async fn test_cancel_before_burn_starts_is_not_lost() {
        let burner = FakeBurner::new();
        let sink = Arc::new(CancelOnClaimSink {
            processor: std::sync::OnceLock::new(),
            result: Mutex::new(None),
        });
        let processor = QueueProcessor::new(burner.clone(), sink.clone());
        sink.processor.set(Arc::downgrade(&processor)).unwrap();

        let ids = processor.add_items(vec![job("hold_a"), job("b")]);
        processor.start();
        wait_idle(&processor).await;

        assert_eq!(*sink.result.lock().unwrap(), Some(true));
        assert_eq!(status_of(&processor, &ids[0]), JobStatus::Cancelled);
        assert_eq!(status_of(&processor, &ids[1]), JobStatus::Completed);
        assert_eq!(burner.started_names(), vec!["hold_a", "b"]);
    }

    #[tokio::test]
    async fn test_cancel_only_affects_current_job() {
        let (burner, processor, _rx) = setup();
        let ids = processor.add_items(vec![job("hold_a"), job("hold_b")]);

        processor.start();
        wait_until(|| burner.is_running()).await;
        assert!(processor.cancel_current());
        wait_until(|| status_of(&processor, &ids[0]) == JobStatus::Cancelled).await;

        wait_until(|| burner.started_names().len() == 2).await;
        burner.release();
        wait_idle(&processor).await;

        assert_eq!(status_of(&processor, &ids[1]), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_replace_settings_applies_to_next_job() {
        let (burner, processor, _rx) = setup();
        processor.add_items(vec![job("hold_a"), job("b")]);

        processor.start();
        wait_until(|| burner.is_running()).await;
        let replaced = processor.replace_settings(EncodingSettings {
            bitrate: "1200k".into(),
            ..Default::default()
        });
        assert_eq!(replaced.bitrate, "1200k");
        burner.release();
        wait_idle(&processor).await;

        assert_eq!(burner.bitrates(), vec!["2400k", "1200k"]);
        assert_eq!(processor.settings().bitrate, "1200k");
    }

    #[tokio::test]
    async fn test_processing_job_is_protected() {
        let (burner, processor, _rx) = setup();
        let ids = processor.add_items(vec![job("hold_a"), job("b"), job("c")]);

        processor.start();
        wait_until(|| processor.is_processing()).await;

        assert_eq!(processor.get_stats().processing, 1);
        assert!(processor.remove_item(&ids[0]).is_err());
        assert!(!processor.reorder_item(0, 2));
        assert!(processor.reorder_item(2, 1));
        let order: Vec<JobId> = processor.get_queue().into_iter().map(|i| i.id).collect();
        assert_eq!(order, vec![ids[0].clone(), ids[2].clone(), ids[1].clone()]);

        assert_eq!(processor.clear_queue(), 2);
        burner.release();
        wait_idle(&processor).await;

        let queue = processor.get_queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].status, JobStatus::Completed);
        assert_eq!(burner.started_names(), vec!["hold_a"]);
    }

    #[tokio::test]
    async fn test_start_twice_keeps_single_job_active() {
        let (burner, processor, _rx) = setup();
        processor.add_items(vec![job("a"), job("b"), job("c"), job("d")]);

        processor.start();
        processor.start();
        processor.resume();
        wait_idle(&processor).await;

        assert_eq!(burner.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(burner.started_names().len(), 4);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_bounded() {
        let (_burner, processor, mut rx) = setup();
        let id = processor.add_item(job("a"));

        processor.start();
        wait_idle(&processor).await;

        let percentages: Vec<f64> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                QueueEvent::ItemProgress { job_id, progress } if job_id == id => {
                    Some(progress.percentage)
                }
                _ => None,
            })
            .collect();
        assert_eq!(percentages, vec![25.0, 50.0, 100.0]);
        assert!(percentages.windows(2).all(|w| w[0] <= w[1]));
        assert!(percentages.iter().all(|p| (0.0..=100.0).contains(p)));
    }

    #[tokio::test]
    async fn test_settings_change_applies_to_next_job() {
        let (burner, processor, _rx) = setup();
        processor.add_items(vec![job("hold_a"), job("b")]);

        processor.start();
        wait_until(|| burner.is_running()).await;
        processor.update_settings(&EncodingSettingsPatch {
            bitrate: Some("6000k".into()),
            ..Default::default()
        });
        burner.release();
        wait_idle(&processor).await;

        assert_eq!(burner.bitrates(), vec!["2400k", "6000k"]);
    }

    #[tokio::test]
    async fn test_retry_failed_job() {
        let (_burner, processor, _rx) = setup();
        let id = processor.add_item(job("fail_once"));

        processor.start();
        wait_idle(&processor).await;
        assert_eq!(status_of(&processor, &id), JobStatus::Error);

        let retry_id = processor.retry(&id).unwrap();
        assert_eq!(status_of(&processor, &retry_id), JobStatus::Pending);
        assert_eq!(status_of(&processor, &id), JobStatus::Error);

        processor.start();
        wait_idle(&processor).await;
        assert!(status_of(&processor, &retry_id).is_terminal());
    }

    #[tokio::test]
    async fn test_stats_always_add_up() {
        let (_burner, processor, _rx) = setup();
        processor.add_items(vec![job("a"), job("fail_b"), job("missing_c"), job("d")]);

        processor.start();
        wait_idle(&processor).await;

        let stats = processor.get_stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.error, 2);
        assert_eq!(
            stats.total,
            stats.pending + stats.processing + stats.completed + stats.error + stats.cancelled
        );
    }

    #[tokio::test]
    async fn test_queue_snapshot_published_on_membership_change() {
        let (_burner, processor, mut rx) = setup();
        let id = processor.add_item(job("a"));
        processor.remove_item(&id).unwrap();

        let events = drain(&mut rx);
        let sizes: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                QueueEvent::QueueUpdated { items } => Some(items.len()),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![1, 0]);
    }
}
