//! FFmpeg Detection Module
//!
//! Locates the FFmpeg executable and probes it for hardware encoders.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{FFmpegError, FFmpegResult};
use crate::core::process::configure_tokio_command;
use crate::core::settings::HardwareEncoder;

/// Environment variable that overrides FFmpeg discovery
pub const FFMPEG_ENV_VAR: &str = "HARDSUB_FFMPEG";

/// Upper bound for the encoder probe
pub const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(3);

/// Information about detected FFmpeg installation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FFmpegInfo {
    /// Path to ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// FFmpeg version string, when `-version` could be read
    pub version: Option<String>,
}

/// Find FFmpeg: `HARDSUB_FFMPEG`, then common install locations, then PATH.
pub fn detect_system_ffmpeg() -> FFmpegResult<FFmpegInfo> {
    let ffmpeg_path = find_ffmpeg()?;
    let version = match get_ffmpeg_version(&ffmpeg_path) {
        Ok(version) => Some(version),
        Err(e) => {
            warn!("Could not read FFmpeg version from {}: {}", ffmpeg_path.display(), e);
            None
        }
    };

    debug!(path = %ffmpeg_path.display(), ?version, "Detected FFmpeg");
    Ok(FFmpegInfo {
        ffmpeg_path,
        version,
    })
}

fn find_ffmpeg() -> FFmpegResult<PathBuf> {
    if let Ok(value) = std::env::var(FFMPEG_ENV_VAR) {
        let path = PathBuf::from(value.trim());
        if path.is_file() {
            return Ok(path);
        }
        warn!(
            "{} points at {}, which is not a file; falling back to discovery",
            FFMPEG_ENV_VAR,
            path.display()
        );
    }

    #[cfg(target_os = "windows")]
    let binary_name = "ffmpeg.exe";

    #[cfg(not(target_os = "windows"))]
    let binary_name = "ffmpeg";

    for dir in get_common_ffmpeg_paths() {
        let candidate = dir.join(binary_name);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    #[cfg(target_os = "windows")]
    let locator = "where";

    #[cfg(not(target_os = "windows"))]
    let locator = "which";

    let output = Command::new(locator)
        .arg("ffmpeg")
        .output()
        .map_err(|_| FFmpegError::NotFound)?;

    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Some(first_line) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
            return Ok(PathBuf::from(first_line));
        }
    }

    Err(FFmpegError::NotFound)
}

/// Get common FFmpeg installation paths for the current platform
fn get_common_ffmpeg_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from(r"C:\ffmpeg\bin"));
        paths.push(PathBuf::from(r"C:\Program Files\ffmpeg\bin"));

        // Chocolatey installation
        if let Ok(programdata) = std::env::var("ProgramData") {
            paths.push(PathBuf::from(programdata).join("chocolatey").join("bin"));
        }

        // Scoop installation
        if let Ok(userprofile) = std::env::var("USERPROFILE") {
            paths.push(PathBuf::from(userprofile).join("scoop").join("shims"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/opt/homebrew/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/snap/bin"));
    }

    paths
}

/// Get FFmpeg version string
fn get_ffmpeg_version(ffmpeg_path: &Path) -> FFmpegResult<String> {
    let output = Command::new(ffmpeg_path).arg("-version").output()?;

    if !output.status.success() {
        return Err(FFmpegError::SpawnFailed(
            "ffmpeg -version returned an error".to_string(),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first_line = stdout.lines().next().unwrap_or_default();

    // "ffmpeg version 6.1.1-full_build ..."
    match first_line
        .strip_prefix("ffmpeg version ")
        .and_then(|rest| rest.split_whitespace().next())
    {
        Some(version) => Ok(version.to_string()),
        None => Ok(first_line.to_string()),
    }
}

// =============================================================================
// Hardware Encoder Probe
// =============================================================================

/// Result of probing FFmpeg for hardware encoders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderAvailability {
    pub available: bool,
    pub info: String,
}

impl EncoderAvailability {
    pub fn unavailable(info: impl Into<String>) -> Self {
        Self {
            available: false,
            info: info.into(),
        }
    }
}

/// Find the first hardware encoder backend listed in `ffmpeg -encoders` output.
pub fn detect_hardware_encoder(encoders_output: &str) -> Option<HardwareEncoder> {
    [
        HardwareEncoder::Nvenc,
        HardwareEncoder::Qsv,
        HardwareEncoder::Amf,
    ]
    .into_iter()
    .find(|backend| {
        let suffix = backend.as_str();
        encoders_output.contains(&format!("h264_{}", suffix))
            || encoders_output.contains(&format!("hevc_{}", suffix))
    })
}

fn describe_backend(backend: HardwareEncoder) -> &'static str {
    match backend {
        HardwareEncoder::Nvenc => "NVIDIA NVENC detected",
        HardwareEncoder::Qsv => "Intel Quick Sync detected",
        HardwareEncoder::Amf => "AMD AMF detected",
    }
}

/// Probe `ffmpeg -encoders`, giving up after [`AVAILABILITY_TIMEOUT`].
///
/// Never fails: every problem is reported through the `info` text.
pub async fn check_availability(ffmpeg_path: &Path) -> EncoderAvailability {
    check_availability_with_timeout(ffmpeg_path, AVAILABILITY_TIMEOUT).await
}

pub async fn check_availability_with_timeout(
    ffmpeg_path: &Path,
    limit: Duration,
) -> EncoderAvailability {
    if !ffmpeg_path.exists() {
        return EncoderAvailability::unavailable("FFmpeg not found");
    }

    let mut cmd = tokio::process::Command::new(ffmpeg_path);
    cmd.args(["-hide_banner", "-encoders"])
        .stdin(std::process::Stdio::null());
    configure_tokio_command(&mut cmd);

    // kill_on_drop reaps the probe if the timeout fires first.
    let output = match tokio::time::timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!("Encoder probe failed: {}", e);
            return EncoderAvailability::unavailable("Error checking GPU");
        }
        Err(_) => {
            warn!("Encoder probe timed out after {:?}", limit);
            return EncoderAvailability::unavailable("Detection timeout");
        }
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    match detect_hardware_encoder(&text) {
        Some(backend) => {
            debug!(backend = backend.as_str(), "Hardware encoder available");
            EncoderAvailability {
                available: true,
                info: describe_backend(backend).to_string(),
            }
        }
        None => EncoderAvailability::unavailable("No hardware encoder detected"),
    }
}
