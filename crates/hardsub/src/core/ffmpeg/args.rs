//! FFmpeg argument construction
//!
//! Turns a burn job plus encoding settings into the exact argument vector
//! handed to the encoder. Everything here is pure so the command line can be
//! checked without spawning anything.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{FFmpegError, FFmpegResult};
use crate::core::settings::EncodingSettings;

/// Longest path (in characters) the encoder is ever handed
pub const MAX_PATH_LENGTH: usize = 32767;

/// Zero-width and BOM characters that silently break filter parsing
const INVISIBLE_CHARS: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

/// Characters with meaning inside a filter graph option value
const FILTER_SPECIAL_CHARS: [char; 7] = [':', '\'', '[', ']', ';', ',', '='];

/// Everything needed to run one burn
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRequest {
    pub video_path: PathBuf,
    pub subtitle_path: PathBuf,
    /// Relative paths are resolved against the video's directory
    pub output_path: PathBuf,
    pub settings: EncodingSettings,
}

impl BurnRequest {
    pub fn new(
        video_path: impl Into<PathBuf>,
        subtitle_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        settings: EncodingSettings,
    ) -> Self {
        Self {
            video_path: video_path.into(),
            subtitle_path: subtitle_path.into(),
            output_path: output_path.into(),
            settings,
        }
    }
}

// =============================================================================
// Path Handling
// =============================================================================

/// Escape a subtitle path for use inside `subtitles='...'`.
///
/// Backslashes are escaped for both the filter graph and the option parser
/// (one becomes four); every other filter metacharacter gets a single
/// backslash. Slashes, spaces and non-ASCII text pass through unchanged.
pub fn escape_subtitle_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len() + 8);
    for c in path.chars() {
        if c == '\\' {
            escaped.push_str("\\\\\\\\");
        } else if FILTER_SPECIAL_CHARS.contains(&c) {
            escaped.push('\\');
            escaped.push(c);
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Reject paths the encoder cannot be trusted to receive intact.
pub fn validate_path_for_ffmpeg(path: &str) -> FFmpegResult<()> {
    if path.contains(['\n', '\r']) {
        return Err(FFmpegError::InvalidPath("Path contains newline characters".to_string()));
    }

    if path.contains('\0') {
        return Err(FFmpegError::InvalidPath("Path contains null bytes".to_string()));
    }

    if path.contains(INVISIBLE_CHARS) {
        return Err(FFmpegError::InvalidPath("Path contains invisible characters".to_string()));
    }

    if path.chars().count() > MAX_PATH_LENGTH {
        return Err(FFmpegError::InvalidPath(format!(
            "Path exceeds maximum length of {} characters",
            MAX_PATH_LENGTH
        )));
    }

    Ok(())
}

/// Resolve the output path: relative paths live next to the source video.
pub fn resolve_output_path(video_path: &Path, output_path: &Path) -> PathBuf {
    if output_path.is_absolute() {
        return output_path.to_path_buf();
    }

    match video_path.parent() {
        Some(dir) => dir.join(output_path),
        None => output_path.to_path_buf(),
    }
}

fn has_mp4_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("mp4"))
        .unwrap_or(false)
}

// =============================================================================
// Argument Construction
// =============================================================================

/// Build the `-vf` chain: optional scale, the subtitle overlay, and a pixel
/// format conversion when a hardware encoder consumes the frames.
pub fn build_filter_chain(subtitle_path: &Path, settings: &EncodingSettings) -> String {
    let mut filters = Vec::with_capacity(3);

    if let Some((width, height)) = settings.scale() {
        filters.push(format!("scale={}:{}", width, height));
    }

    let escaped = escape_subtitle_path(&subtitle_path.to_string_lossy());
    filters.push(format!("subtitles='{}'", escaped));

    if settings.acceleration_enabled {
        filters.push("format=yuv420p".to_string());
    }

    filters.join(",")
}

/// Build the full encoder argument vector for one burn.
///
/// `output_path` must already be resolved.
pub fn build_burn_args(
    video_path: &Path,
    subtitle_path: &Path,
    output_path: &Path,
    settings: &EncodingSettings,
) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    if settings.decode_acceleration {
        args.push("-hwaccel".into());
        args.push(settings.hardware_encoder.decode_accel().into());
    }

    args.push("-i".into());
    args.push(video_path.to_string_lossy().into_owned());

    args.push("-vf".into());
    args.push(build_filter_chain(subtitle_path, settings));

    if settings.acceleration_enabled {
        push_hardware_encoder_args(&mut args, settings);
    } else {
        args.push("-c:v".into());
        args.push(settings.codec.software_encoder().into());
        args.push("-b:v".into());
        args.push(settings.bitrate.clone());
        args.push("-preset".into());
        args.push("veryfast".into());
        args.push("-tune".into());
        args.push("animation".into());
    }

    args.push("-c:a".into());
    args.push("copy".into());

    if has_mp4_extension(output_path) {
        args.push("-movflags".into());
        args.push("+faststart".into());
    }

    args.push("-y".into());
    args.push(output_path.to_string_lossy().into_owned());

    args
}

fn push_hardware_encoder_args(args: &mut Vec<String>, settings: &EncodingSettings) {
    let rc = settings.rate_control_mode;

    args.push("-c:v".into());
    args.push(settings.hardware_encoder.encoder_name(settings.codec));

    args.push("-rc:v".into());
    args.push(rc.as_str().into());

    if rc.is_quality_constrained() {
        args.push("-cq:v".into());
        args.push(settings.quality_param.to_string());
    }

    args.push("-preset".into());
    args.push(settings.encoder_preset.as_str().into());
    args.push("-tune".into());
    args.push("hq".into());

    if settings.spatial_aq {
        args.push("-spatial_aq".into());
        args.push("1".into());
    }
    if settings.temporal_aq {
        args.push("-temporal_aq".into());
        args.push("1".into());
    }

    args.push("-rc-lookahead".into());
    args.push(settings.lookahead.to_string());

    // Quality-constrained modes let the encoder pick the bitrate.
    args.push("-b:v".into());
    if rc.is_quality_constrained() {
        args.push("0".into());
    } else {
        args.push(settings.bitrate.clone());
    }
}
