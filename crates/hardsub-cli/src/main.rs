use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use hardsub_lib::core::ffmpeg::{
    BurnOutcome, BurnRequest, Burner, FFmpegBurner, InvocationEvent, LogCategory,
};
use hardsub_lib::core::queue::{JobDescriptor, QueueProcessor};
use hardsub_lib::core::settings::{
    default_settings_dir, EncodingSettingsPatch, HardwareEncoder, QualityPreset, SettingsManager,
    VideoCodec,
};
use hardsub_lib::ipc::{handle_json, BroadcastEventSink, ChannelEventSink, QueueEvent};

#[derive(Parser)]
#[command(name = "hardsub")]
#[command(about = "Burn ASS subtitles into videos with FFmpeg, one file or a whole queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// FFmpeg executable (defaults to HARDSUB_FFMPEG, then auto-detection)
    #[arg(long, global = true)]
    ffmpeg: Option<PathBuf>,

    /// Settings directory
    #[arg(long, global = true)]
    settings_dir: Option<PathBuf>,

    /// Also write daily rolling log files to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Burn subtitles into a single video
    Burn {
        /// Source video
        #[arg(short, long)]
        video: PathBuf,

        /// ASS subtitle file
        #[arg(short, long)]
        subtitle: PathBuf,

        /// Output file (relative paths are placed next to the video)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        encoding: EncodingArgs,
    },

    /// Run a batch of jobs from a JSON file
    Queue {
        /// JSON array of {"videoPath", "subtitlePath", "outputPath"} objects
        jobs: PathBuf,

        #[command(flatten)]
        encoding: EncodingArgs,
    },

    /// Serve the queue over stdin/stdout as JSON lines
    Serve,

    /// Check FFmpeg for hardware encoders
    CheckGpu,

    /// Show or change persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings
    Show,
    /// Update encoding settings
    Set {
        #[command(flatten)]
        encoding: EncodingArgs,
    },
    /// Restore defaults
    Reset,
}

#[derive(Args, Debug, Default)]
struct EncodingArgs {
    /// Bitrate preset (ultra, high, medium, low)
    #[arg(long)]
    quality: Option<QualityPreset>,

    /// Target video bitrate, e.g. 2400k (overrides --quality)
    #[arg(long)]
    bitrate: Option<String>,

    /// Encode with a hardware encoder
    #[arg(long)]
    gpu: bool,

    /// Encode in software even if settings enable the GPU
    #[arg(long, conflicts_with = "gpu")]
    cpu: bool,

    /// Decode with hardware acceleration
    #[arg(long)]
    gpu_decode: bool,

    /// Video codec (h264, hevc)
    #[arg(long)]
    codec: Option<VideoCodec>,

    /// Hardware encoder backend (nvenc, qsv, amf)
    #[arg(long)]
    encoder: Option<HardwareEncoder>,

    /// Constant-quality value for quality-constrained rate control (0-51)
    #[arg(long)]
    cq: Option<u8>,

    /// Output resolution as WIDTHxHEIGHT
    #[arg(long)]
    scale: Option<String>,
}

impl EncodingArgs {
    fn to_patch(&self) -> Result<EncodingSettingsPatch> {
        let mut patch = self
            .quality
            .map(EncodingSettingsPatch::from_quality_preset)
            .unwrap_or_default();

        if let Some(bitrate) = &self.bitrate {
            patch.bitrate = Some(bitrate.clone());
        }
        if self.gpu {
            patch.acceleration_enabled = Some(true);
        } else if self.cpu {
            patch.acceleration_enabled = Some(false);
        }
        if self.gpu_decode {
            patch.decode_acceleration = Some(true);
        }
        patch.codec = self.codec;
        patch.hardware_encoder = self.encoder;
        patch.quality_param = self.cq;

        if let Some(scale) = &self.scale {
            let (width, height) = parse_scale(scale)?;
            patch.scale_width = Some(Some(width));
            patch.scale_height = Some(Some(height));
        }

        Ok(patch)
    }
}

fn parse_scale(value: &str) -> Result<(u32, u32)> {
    let (w, h) = value
        .split_once(['x', 'X', ':'])
        .with_context(|| format!("Scale must look like 1280x720, got {}", value))?;
    let width = w.trim().parse().context("Invalid scale width")?;
    let height = h.trim().parse().context("Invalid scale height")?;
    Ok((width, height))
}

struct AppContext {
    ffmpeg: Option<PathBuf>,
    settings: SettingsManager,
}

impl AppContext {
    fn burner(&self) -> Result<FFmpegBurner> {
        match &self.ffmpeg {
            Some(path) => Ok(FFmpegBurner::new(path)),
            None => FFmpegBurner::detect().context("Could not locate FFmpeg"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    hardsub_lib::init_logging(cli.log_dir.as_deref());

    let settings_dir = cli.settings_dir.unwrap_or_else(default_settings_dir);
    let ctx = AppContext {
        ffmpeg: cli.ffmpeg,
        settings: SettingsManager::new(settings_dir),
    };

    match cli.command {
        Commands::Burn {
            video,
            subtitle,
            output,
            encoding,
        } => run_burn(&ctx, video, subtitle, output, &encoding).await,
        Commands::Queue { jobs, encoding } => run_queue(&ctx, &jobs, &encoding).await,
        Commands::Serve => run_serve(&ctx).await,
        Commands::CheckGpu => run_check_gpu(&ctx).await,
        Commands::Settings { action } => run_settings(&ctx, action),
    }
}

// =============================================================================
// Single Burn
// =============================================================================

async fn run_burn(
    ctx: &AppContext,
    video: PathBuf,
    subtitle: PathBuf,
    output: Option<PathBuf>,
    encoding: &EncodingArgs,
) -> Result<()> {
    let app_settings = ctx.settings.load();
    let mut settings = app_settings.encoding.clone();
    settings.apply(&encoding.to_patch()?);

    let output = output.unwrap_or_else(|| app_settings.output.default_output_path(&video));
    let burner = Arc::new(ctx.burner()?);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_invocation_event(&event);
        }
    });

    let watcher = {
        let burner = Arc::clone(&burner);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                burner.cancel();
            }
        })
    };

    let request = BurnRequest::new(video, subtitle, output, settings);
    let result = burner.burn(request, tx).await;
    watcher.abort();
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;
    eprintln!();

    match result? {
        BurnOutcome::Completed { output_path } => {
            println!("{}", output_path.display());
            Ok(())
        }
        BurnOutcome::Cancelled => bail!("Burn cancelled"),
    }
}

fn print_invocation_event(event: &InvocationEvent) {
    match event {
        InvocationEvent::Progress(p) => {
            eprint!(
                "\r{:>6.2}%  time={}  fps={:.1}  speed={}  eta={}    ",
                p.percentage,
                p.time,
                p.fps,
                p.speed,
                p.eta.as_deref().unwrap_or("-")
            );
        }
        InvocationEvent::Log { line, category } => log_line(*category, line),
        InvocationEvent::Completed { .. } | InvocationEvent::Failed { .. } => {}
    }
}

fn log_line(category: LogCategory, line: &str) {
    match category {
        LogCategory::Error => error!(target: "ffmpeg", "{}", line),
        LogCategory::Warning => warn!(target: "ffmpeg", "{}", line),
        LogCategory::Debug | LogCategory::Metadata => debug!(target: "ffmpeg", "{}", line),
        LogCategory::Info | LogCategory::Success => info!(target: "ffmpeg", "{}", line),
    }
}

// =============================================================================
// Batch Queue
// =============================================================================

async fn run_queue(ctx: &AppContext, jobs_file: &Path, encoding: &EncodingArgs) -> Result<()> {
    let raw = std::fs::read_to_string(jobs_file)
        .with_context(|| format!("Failed to read {}", jobs_file.display()))?;
    let jobs: Vec<JobDescriptor> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid jobs file {}", jobs_file.display()))?;
    if jobs.is_empty() {
        bail!("No jobs in {}", jobs_file.display());
    }

    let mut settings = ctx.settings.load().encoding;
    settings.apply(&encoding.to_patch()?);

    let burner: Arc<dyn Burner> = Arc::new(ctx.burner()?);
    let (sink, mut events) = ChannelEventSink::new();
    let processor = QueueProcessor::with_settings(burner, Arc::new(sink), settings);

    processor.add_items(jobs);
    processor.start();

    let watcher = {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted: stopping the queue");
                processor.pause();
                processor.cancel_current();
            }
        })
    };

    loop {
        tokio::select! {
            Some(event) = events.recv() => print_queue_event(&event),
            _ = processor.wait_idle() => break,
        }
    }
    while let Ok(event) = events.try_recv() {
        print_queue_event(&event);
    }
    watcher.abort();

    let stats = processor.get_stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    if stats.error > 0 || stats.cancelled > 0 || stats.pending > 0 {
        bail!(
            "{} of {} job(s) did not complete",
            stats.total - stats.completed,
            stats.total
        );
    }
    Ok(())
}

fn print_queue_event(event: &QueueEvent) {
    match event {
        QueueEvent::ItemProgress { progress, .. } => {
            eprint!(
                "\r{:>6.2}%  time={}  speed={}  eta={}    ",
                progress.percentage,
                progress.time,
                progress.speed,
                progress.eta.as_deref().unwrap_or("-")
            );
        }
        QueueEvent::ItemLog { line, category, .. } => log_line(*category, line),
        QueueEvent::ItemCompleted { output_path, .. } => {
            eprintln!();
            info!("Completed: {}", output_path.display());
        }
        QueueEvent::ItemError { job_id, message } => {
            eprintln!();
            error!(job_id = %job_id, "Failed: {}", message);
        }
        QueueEvent::QueueCompleted => info!("Queue completed"),
        QueueEvent::QueueUpdated { .. } | QueueEvent::ItemUpdated { .. } => {}
    }
}

// =============================================================================
// JSON Lines Server
// =============================================================================

async fn run_serve(ctx: &AppContext) -> Result<()> {
    let burner = match ctx.burner() {
        Ok(burner) => burner,
        Err(e) => {
            warn!("{:#}; jobs will fail until FFmpeg is installed", e);
            FFmpegBurner::new("ffmpeg")
        }
    };

    let sink = Arc::new(BroadcastEventSink::new(1024));
    let mut events = sink.subscribe();
    let processor =
        QueueProcessor::with_settings(Arc::new(burner), sink, ctx.settings.load().encoding);

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                break;
            }
        }
    });

    let forwarder = {
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let line = json!({
                            "type": "event",
                            "name": event.name(),
                            "payload": event,
                        });
                        if out_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event stream lagged, {} event(s) dropped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    info!("Serving queue commands on stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_json(&processor, &line).await;
        let reply = json!({ "type": "response", "response": response });
        if out_tx.send(reply.to_string()).is_err() {
            break;
        }
    }

    info!("Input closed, stopping the queue");
    processor.pause();
    processor.cancel_current();
    processor.wait_idle().await;

    forwarder.abort();
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

// =============================================================================
// Misc Commands
// =============================================================================

async fn run_check_gpu(ctx: &AppContext) -> Result<()> {
    let availability = match ctx.burner() {
        Ok(burner) => burner.check_availability().await,
        Err(e) => {
            debug!("{:#}", e);
            hardsub_lib::core::ffmpeg::EncoderAvailability::unavailable("FFmpeg not found")
        }
    };
    println!("{}", serde_json::to_string_pretty(&availability)?);
    Ok(())
}

fn run_settings(ctx: &AppContext, action: SettingsAction) -> Result<()> {
    let settings = match action {
        SettingsAction::Show => ctx.settings.load(),
        SettingsAction::Set { encoding } => {
            let mut settings = ctx.settings.load();
            settings.encoding.apply(&encoding.to_patch()?);
            ctx.settings.save(&settings)?
        }
        SettingsAction::Reset => ctx.settings.reset()?,
    };
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
