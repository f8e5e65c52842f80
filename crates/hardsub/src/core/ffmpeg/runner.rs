//! FFmpeg invocation runner
//!
//! Owns at most one external encoder process at a time. The process's
//! diagnostic stream is turned into [`InvocationEvent`]s as it arrives, and
//! the invocation resolves once the process has exited and every line it
//! printed has been delivered.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::{
    build_burn_args, categorize_log_line, detection, is_progress_noise, parse_progress_line,
    resolve_output_path, validate_path_for_ffmpeg, BurnProgress, BurnRequest, EncoderAvailability,
    FFmpegError, FFmpegResult, InputKind, LineSplitter, LogCategory, ProgressTracker,
};
use crate::core::process::{configure_tokio_command, request_termination};
use crate::ipc::events::event_names;

/// How long to wait for the output readers once the process has exited
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Events & Outcomes
// =============================================================================

/// Event produced while a single burn runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InvocationEvent {
    Progress(BurnProgress),
    #[serde(rename_all = "camelCase")]
    Log {
        line: String,
        category: LogCategory,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        output_path: PathBuf,
    },
    Failed {
        message: String,
    },
}

impl InvocationEvent {
    /// Channel name used when the event is forwarded to a frontend
    pub fn name(&self) -> &'static str {
        match self {
            Self::Progress(_) => event_names::FFMPEG_PROGRESS,
            Self::Log { .. } => event_names::FFMPEG_LOG,
            Self::Completed { .. } => event_names::FFMPEG_COMPLETE,
            Self::Failed { .. } => event_names::FFMPEG_ERROR,
        }
    }
}

/// Sending half handed to a burn
pub type InvocationEvents = mpsc::UnboundedSender<InvocationEvent>;

/// How a burn that did not fail ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BurnOutcome {
    Completed { output_path: PathBuf },
    Cancelled,
}

/// Executes subtitle burns.
///
/// The queue only talks to this trait, so tests can swap in a scripted burner.
#[async_trait]
pub trait Burner: Send + Sync {
    /// Run one burn to completion. Events are sent while it runs; a dropped
    /// receiver is not an error.
    async fn burn(
        &self,
        request: BurnRequest,
        events: InvocationEvents,
    ) -> FFmpegResult<BurnOutcome>;

    /// Ask the active burn to stop. Returns false when there was nothing to stop.
    fn cancel(&self) -> bool;

    /// Whether a burn currently holds the process slot
    fn is_running(&self) -> bool;

    /// Probe for hardware encoders
    async fn check_availability(&self) -> EncoderAvailability {
        EncoderAvailability::unavailable("Hardware detection not supported")
    }
}

// =============================================================================
// FFmpeg Burner
// =============================================================================

struct ActiveInvocation {
    cancel_tx: Option<oneshot::Sender<()>>,
}

/// Releases the process slot however the burn ends.
struct ActiveSlot<'a> {
    slot: &'a Mutex<Option<ActiveInvocation>>,
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn emit(events: &InvocationEvents, event: InvocationEvent) {
    // The receiver may already be gone; the burn carries on regardless.
    let _ = events.send(event);
}

fn emit_log(events: &InvocationEvents, category: LogCategory, line: impl Into<String>) {
    emit(
        events,
        InvocationEvent::Log {
            line: line.into(),
            category,
        },
    );
}

/// Burner backed by a real FFmpeg executable
pub struct FFmpegBurner {
    ffmpeg_path: PathBuf,
    active: Mutex<Option<ActiveInvocation>>,
}

impl FFmpegBurner {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            active: Mutex::new(None),
        }
    }

    /// Create a burner for the FFmpeg found on this system
    pub fn detect() -> FFmpegResult<Self> {
        let info = detection::detect_system_ffmpeg()?;
        info!(
            "Using FFmpeg at {} ({})",
            info.ffmpeg_path.display(),
            info.version.as_deref().unwrap_or("unknown version")
        );
        Ok(Self::new(info.ffmpeg_path))
    }

    fn claim(&self) -> FFmpegResult<(ActiveSlot<'_>, oneshot::Receiver<()>)> {
        let mut active = lock(&self.active);
        if active.is_some() {
            return Err(FFmpegError::AlreadyRunning);
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        *active = Some(ActiveInvocation {
            cancel_tx: Some(cancel_tx),
        });

        Ok((
            ActiveSlot {
                slot: &self.active,
            },
            cancel_rx,
        ))
    }

    async fn run(
        &self,
        request: BurnRequest,
        events: &InvocationEvents,
        mut cancel_rx: oneshot::Receiver<()>,
    ) -> FFmpegResult<BurnOutcome> {
        let BurnRequest {
            video_path,
            subtitle_path,
            output_path,
            settings,
        } = request;

        for path in [&video_path, &subtitle_path, &output_path] {
            validate_path_for_ffmpeg(&path.to_string_lossy())?;
        }
        ensure_input_exists(InputKind::Video, &video_path).await?;
        ensure_input_exists(InputKind::Subtitle, &subtitle_path).await?;

        let output_path = resolve_output_path(&video_path, &output_path);
        prepare_output_dir(&output_path, events).await;

        emit_log(events, LogCategory::Info, "Starting subtitle burn");
        emit_log(
            events,
            LogCategory::Info,
            format!("Video: {}", video_path.display()),
        );
        emit_log(
            events,
            LogCategory::Info,
            format!("Subtitles: {}", subtitle_path.display()),
        );
        emit_log(
            events,
            LogCategory::Info,
            format!("Output: {}", output_path.display()),
        );
        emit_log(events, LogCategory::Info, settings.summary());

        let args = build_burn_args(&video_path, &subtitle_path, &output_path, &settings);
        emit_log(
            events,
            LogCategory::Debug,
            format!("Command: {} {}", self.ffmpeg_path.display(), args.join(" ")),
        );

        let mut cmd = tokio::process::Command::new(&self.ffmpeg_path);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        configure_tokio_command(&mut cmd);

        let started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("Process error: {}", e);
                emit_log(events, LogCategory::Error, message.clone());
                emit(events, InvocationEvent::Failed { message });
                return Err(FFmpegError::SpawnFailed(e.to_string()));
            }
        };
        debug!(pid = ?child.id(), "FFmpeg process started");

        // Drain both pipes concurrently so FFmpeg never blocks on a full buffer.
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_diagnostics(stderr, events.clone(), started)));
        let stdout_task = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(read_stdout(stdout, events.clone())));

        let mut cancelled = false;
        let wait_result = tokio::select! {
            status = child.wait() => status,
            Ok(()) = &mut cancel_rx => {
                cancelled = true;
                emit_log(events, LogCategory::Warning, "Cancelling process...");
                request_termination(&mut child);
                child.wait().await
            }
        };

        for task in [stderr_task, stdout_task].into_iter().flatten() {
            join_reader(task).await;
        }

        let status = match wait_result {
            Ok(status) => status,
            Err(e) => {
                let message = format!("Process error: {}", e);
                emit_log(events, LogCategory::Error, message.clone());
                emit(events, InvocationEvent::Failed { message });
                return Err(FFmpegError::ProcessError(e));
            }
        };

        // FFmpeg exits with 255 after SIGTERM, so a requested cancel wins
        // over the exit code.
        let code = match status.code() {
            Some(code) if !cancelled => code,
            _ => {
                emit_log(events, LogCategory::Warning, "Process was cancelled");
                info!("Burn cancelled after {:.1}s", started.elapsed().as_secs_f64());
                return Ok(BurnOutcome::Cancelled);
            }
        };

        if code == 0 {
            emit_log(events, LogCategory::Success, "Process completed successfully!");
            emit(
                events,
                InvocationEvent::Completed {
                    output_path: output_path.clone(),
                },
            );
            info!(
                "Burn completed in {:.1}s: {}",
                started.elapsed().as_secs_f64(),
                output_path.display()
            );
            return Ok(BurnOutcome::Completed { output_path });
        }

        let err = FFmpegError::NonZeroExit { code };
        emit_log(events, LogCategory::Error, err.to_string());
        emit(
            events,
            InvocationEvent::Failed {
                message: err.to_string(),
            },
        );
        Err(err)
    }
}

#[async_trait]
impl Burner for FFmpegBurner {
    async fn burn(
        &self,
        request: BurnRequest,
        events: InvocationEvents,
    ) -> FFmpegResult<BurnOutcome> {
        let (_slot, cancel_rx) = self.claim()?;
        info!(
            video = %request.video_path.display(),
            subtitles = %request.subtitle_path.display(),
            "Starting burn"
        );

        let result = self.run(request, &events, cancel_rx).await;
        if let Err(e) = &result {
            error!("Burn failed: {}", e);
        }
        result
    }

    fn cancel(&self) -> bool {
        let mut active = lock(&self.active);
        match active.as_mut().and_then(|a| a.cancel_tx.take()) {
            Some(cancel_tx) => {
                info!("Cancelling active burn");
                let _ = cancel_tx.send(());
                true
            }
            None => false,
        }
    }

    fn is_running(&self) -> bool {
        lock(&self.active).is_some()
    }

    async fn check_availability(&self) -> EncoderAvailability {
        detection::check_availability(&self.ffmpeg_path).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn ensure_input_exists(kind: InputKind, path: &Path) -> FFmpegResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(FFmpegError::InputNotFound {
            kind,
            path: path.to_path_buf(),
        }),
    }
}

/// Create the output directory. Failure is logged; FFmpeg reports the real error.
async fn prepare_output_dir(output_path: &Path, events: &InvocationEvents) {
    let Some(dir) = output_path.parent().filter(|d| !d.as_os_str().is_empty()) else {
        return;
    };

    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!("Failed to create output directory {}: {}", dir.display(), e);
        emit_log(
            events,
            LogCategory::Warning,
            format!("Could not create output directory {}: {}", dir.display(), e),
        );
    }
}

async fn read_diagnostics(mut stderr: ChildStderr, events: InvocationEvents, started: Instant) {
    let mut splitter = LineSplitter::new();
    let mut tracker = ProgressTracker::new();
    let mut buf = [0u8; 4096];

    loop {
        match stderr.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in splitter.push(&buf[..n]) {
                    handle_diagnostic_line(&line, &mut tracker, &events, started);
                }
            }
            Err(e) => {
                warn!("Failed to read FFmpeg stderr: {}", e);
                break;
            }
        }
    }

    if let Some(line) = splitter.finish() {
        handle_diagnostic_line(&line, &mut tracker, &events, started);
    }
}

fn handle_diagnostic_line(
    line: &str,
    tracker: &mut ProgressTracker,
    events: &InvocationEvents,
    started: Instant,
) {
    trace!(target: "ffmpeg", "{}", line);

    if let Some((raw, seconds)) = tracker.observe_duration(line) {
        emit_log(
            events,
            LogCategory::Metadata,
            format!("Video duration detected: {} ({}s)", raw, seconds),
        );
    }

    if let Some(sample) = parse_progress_line(line) {
        let progress = tracker.progress(sample, started.elapsed());
        emit(events, InvocationEvent::Progress(progress));
    }

    if !is_progress_noise(line) {
        emit_log(events, categorize_log_line(line), line);
    }
}

async fn read_stdout(stdout: ChildStdout, events: InvocationEvents) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if !line.is_empty() {
                    emit_log(&events, LogCategory::Debug, format!("[stdout] {}", line));
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read FFmpeg stdout: {}", e);
                break;
            }
        }
    }
}

async fn join_reader(mut task: JoinHandle<()>) {
    match tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Output reader task failed: {}", e),
        Err(_) => {
            // A grandchild can keep the pipe open after FFmpeg itself exited.
            warn!("Output reader still busy after process exit, abandoning it");
            task.abort();
        }
    }
}
