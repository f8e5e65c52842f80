//! Settings System
//!
//! Provides:
//! - Encoding settings read fresh by every invocation
//! - Partial settings updates pushed by the UI
//! - Persistent application settings with atomic file writes (temp file + rename)
//!
//! Storage location: {config_dir}/hardsub/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const SETTINGS_LOCK_FILE: &str = "settings.json.lock";

/// Default target bitrate
pub const DEFAULT_BITRATE: &str = "2400k";

// =============================================================================
// Encoder Option Enums
// =============================================================================

/// Output video codec family
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    Hevc,
}

impl VideoCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::Hevc => "hevc",
        }
    }

    /// Software encoder used when hardware encoding is off
    pub fn software_encoder(&self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::Hevc => "libx265",
        }
    }
}

/// Hardware encoder backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareEncoder {
    /// NVIDIA NVENC
    #[default]
    Nvenc,
    /// Intel Quick Sync Video
    Qsv,
    /// AMD Advanced Media Framework
    Amf,
}

impl HardwareEncoder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nvenc => "nvenc",
            Self::Qsv => "qsv",
            Self::Amf => "amf",
        }
    }

    /// Full encoder name, e.g. `hevc_nvenc`
    pub fn encoder_name(&self, codec: VideoCodec) -> String {
        format!("{}_{}", codec.as_str(), self.as_str())
    }

    /// Value for `-hwaccel` when hardware decoding is requested
    pub fn decode_accel(&self) -> &'static str {
        match self {
            Self::Qsv => "qsv",
            Self::Nvenc | Self::Amf => "d3d11va",
        }
    }
}

/// Hardware encoder speed/quality preset (p1 fastest, p7 best)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderPreset {
    P1,
    P2,
    P3,
    #[default]
    P4,
    P5,
    P6,
    P7,
}

impl EncoderPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P1 => "p1",
            Self::P2 => "p2",
            Self::P3 => "p3",
            Self::P4 => "p4",
            Self::P5 => "p5",
            Self::P6 => "p6",
            Self::P7 => "p7",
        }
    }
}

/// Rate-control mode of the hardware encoder
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateControlMode {
    /// Constant quality
    Cq,
    /// Variable bitrate
    Vbr,
    /// Variable bitrate with quality floor
    #[default]
    VbrHq,
    /// Constant bitrate
    Cbr,
}

impl RateControlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cq => "cq",
            Self::Vbr => "vbr",
            Self::VbrHq => "vbr_hq",
            Self::Cbr => "cbr",
        }
    }

    /// Quality-constrained modes take an explicit quality parameter and an
    /// unconstrained bitrate instead of a literal target.
    pub fn is_quality_constrained(&self) -> bool {
        matches!(self, Self::Cq | Self::VbrHq)
    }
}

/// Named bitrate presets offered by the UI
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Ultra,
    High,
    #[default]
    Medium,
    Low,
    Custom,
}

impl QualityPreset {
    /// Bitrate for the preset; `None` for `Custom`
    pub fn bitrate(&self) -> Option<&'static str> {
        match self {
            Self::Ultra => Some("6000k"),
            Self::High => Some("4000k"),
            Self::Medium => Some("2400k"),
            Self::Low => Some("1200k"),
            Self::Custom => None,
        }
    }
}

/// Parses the serde name of an option enum, case-insensitively.
fn parse_named<T: serde::de::DeserializeOwned>(kind: &str, value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_ascii_lowercase()))
        .map_err(|_| format!("Unknown {}: {}", kind, value))
}

impl std::str::FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h265" | "x265" => Ok(Self::Hevc),
            "x264" => Ok(Self::H264),
            _ => parse_named("codec", s),
        }
    }
}

impl std::str::FromStr for HardwareEncoder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_named("hardware encoder", s)
    }
}

impl std::str::FromStr for EncoderPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_named("encoder preset", s)
    }
}

impl std::str::FromStr for RateControlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_named("rate control mode", s)
    }
}

impl std::str::FromStr for QualityPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_named("quality preset", s)
    }
}

// =============================================================================
// Encoding Settings
// =============================================================================

/// Encoding settings held by the queue and captured by every invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncodingSettings {
    /// Target bitrate, e.g. "2400k"
    #[serde(default = "default_bitrate")]
    pub bitrate: String,

    /// Use the hardware encoder
    #[serde(default)]
    pub acceleration_enabled: bool,

    /// Use hardware decoding (off by default; libass renders on the CPU anyway)
    #[serde(default)]
    pub decode_acceleration: bool,

    #[serde(default)]
    pub codec: VideoCodec,

    #[serde(default)]
    pub hardware_encoder: HardwareEncoder,

    #[serde(default)]
    pub encoder_preset: EncoderPreset,

    #[serde(default)]
    pub rate_control_mode: RateControlMode,

    /// Quality parameter for quality-constrained modes (0-51, lower is better)
    #[serde(default = "default_quality_param")]
    pub quality_param: u8,

    #[serde(default = "default_true", rename = "spatialAQ")]
    pub spatial_aq: bool,

    #[serde(default = "default_true", rename = "temporalAQ")]
    pub temporal_aq: bool,

    /// Rate-control lookahead in frames
    #[serde(default = "default_lookahead")]
    pub lookahead: u32,

    #[serde(default)]
    pub scale_width: Option<u32>,

    #[serde(default)]
    pub scale_height: Option<u32>,
}

fn default_bitrate() -> String {
    DEFAULT_BITRATE.to_string()
}

fn default_quality_param() -> u8 {
    19
}

fn default_lookahead() -> u32 {
    20
}

fn default_true() -> bool {
    true
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            bitrate: default_bitrate(),
            acceleration_enabled: false,
            decode_acceleration: false,
            codec: VideoCodec::default(),
            hardware_encoder: HardwareEncoder::default(),
            encoder_preset: EncoderPreset::default(),
            rate_control_mode: RateControlMode::default(),
            quality_param: default_quality_param(),
            spatial_aq: true,
            temporal_aq: true,
            lookahead: default_lookahead(),
            scale_width: None,
            scale_height: None,
        }
    }
}

impl EncodingSettings {
    /// Output scaling, only when both dimensions are set
    pub fn scale(&self) -> Option<(u32, u32)> {
        match (self.scale_width, self.scale_height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }

    /// Merges a partial update into these settings.
    pub fn apply(&mut self, patch: &EncodingSettingsPatch) {
        if let Some(bitrate) = &patch.bitrate {
            self.bitrate = bitrate.clone();
        }
        if let Some(v) = patch.acceleration_enabled {
            self.acceleration_enabled = v;
        }
        if let Some(v) = patch.decode_acceleration {
            self.decode_acceleration = v;
        }
        if let Some(v) = patch.codec {
            self.codec = v;
        }
        if let Some(v) = patch.hardware_encoder {
            self.hardware_encoder = v;
        }
        if let Some(v) = patch.encoder_preset {
            self.encoder_preset = v;
        }
        if let Some(v) = patch.rate_control_mode {
            self.rate_control_mode = v;
        }
        if let Some(v) = patch.quality_param {
            self.quality_param = v;
        }
        if let Some(v) = patch.spatial_aq {
            self.spatial_aq = v;
        }
        if let Some(v) = patch.temporal_aq {
            self.temporal_aq = v;
        }
        if let Some(v) = patch.lookahead {
            self.lookahead = v;
        }
        if let Some(v) = patch.scale_width {
            self.scale_width = v;
        }
        if let Some(v) = patch.scale_height {
            self.scale_height = v;
        }
        self.normalize();
    }

    /// Normalizes and clamps settings so an invocation never sees bad values.
    ///
    /// Bad values are corrected, never rejected.
    pub fn normalize(&mut self) {
        let trimmed = self.bitrate.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
            self.bitrate = default_bitrate();
        } else if trimmed.len() != self.bitrate.len() {
            self.bitrate = trimmed.to_string();
        }

        self.quality_param = self.quality_param.min(51);
        self.lookahead = self.lookahead.min(32);

        if self.scale_width == Some(0) || self.scale_height == Some(0) || self.scale().is_none() {
            self.scale_width = None;
            self.scale_height = None;
        }
    }

    /// One-line summary used in the invocation log
    pub fn summary(&self) -> String {
        let encoder = if self.acceleration_enabled {
            self.hardware_encoder.as_str()
        } else {
            "software"
        };
        let on_off = |v: bool| if v { "ON" } else { "OFF" };
        format!(
            "Quality: {}, CQ={} | Encoder: {} {} | GPU Encode: {} | GPU Decode: {}",
            self.rate_control_mode.as_str(),
            self.quality_param,
            self.codec.as_str(),
            encoder,
            on_off(self.acceleration_enabled),
            on_off(self.decode_acceleration),
        )
    }
}

/// Partial settings update as pushed by the UI collaborator.
///
/// `scaleWidth`/`scaleHeight` use a nested option: absent leaves the current
/// value, `null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncodingSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_acceleration: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<VideoCodec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_encoder: Option<HardwareEncoder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder_preset: Option<EncoderPreset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_control_mode: Option<RateControlMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_param: Option<u8>,
    #[serde(default, rename = "spatialAQ", skip_serializing_if = "Option::is_none")]
    pub spatial_aq: Option<bool>,
    #[serde(default, rename = "temporalAQ", skip_serializing_if = "Option::is_none")]
    pub temporal_aq: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookahead: Option<u32>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub scale_width: Option<Option<u32>>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub scale_height: Option<Option<u32>>,
}

/// Distinguishes an explicit `null` (Some(None)) from an absent key (None).
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl EncodingSettingsPatch {
    /// Patch that only sets the bitrate from a named preset
    pub fn from_quality_preset(preset: QualityPreset) -> Self {
        Self {
            bitrate: preset.bitrate().map(str::to_string),
            ..Default::default()
        }
    }
}

// =============================================================================
// Application Settings
// =============================================================================

/// Output location preferences
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputSettings {
    /// Directory for burned files; `None` writes next to the source video
    #[serde(default)]
    pub default_directory: Option<PathBuf>,

    /// Appended to the video file stem
    #[serde(default = "default_output_suffix")]
    pub suffix: String,

    /// Output container extension
    #[serde(default = "default_container")]
    pub container: String,
}

fn default_output_suffix() -> String {
    "_hardsub".to_string()
}

fn default_container() -> String {
    "mp4".to_string()
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            default_directory: None,
            suffix: default_output_suffix(),
            container: default_container(),
        }
    }
}

impl OutputSettings {
    /// Default output path for a video: `<dir>/<stem><suffix>.<container>`
    pub fn default_output_path(&self, video_path: &Path) -> PathBuf {
        let stem = video_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let dir = match &self.default_directory {
            Some(dir) => dir.clone(),
            None => video_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        dir.join(format!("{}{}.{}", stem, self.suffix, self.container))
    }

    fn normalize(&mut self) {
        let container = self.container.trim().trim_start_matches('.').to_ascii_lowercase();
        self.container = if ["mp4", "mkv", "mov"].contains(&container.as_str()) {
            container
        } else {
            default_container()
        };
        if self.suffix.contains(|c| c == '/' || c == '\\') {
            self.suffix = default_output_suffix();
        }
    }
}

/// Persisted application settings relevant to the job execution core
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub encoding: EncodingSettings,

    #[serde(default)]
    pub output: OutputSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            encoding: EncodingSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;
        self.encoding.normalize();
        self.output.normalize();
    }
}

/// Default directory holding the settings file
pub fn default_settings_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hardsub")
}

/// Settings manager for loading, saving, and resetting settings
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager with the given app data directory
    pub fn new(app_data_dir: PathBuf) -> Self {
        Self {
            settings_path: app_data_dir.join(SETTINGS_FILE),
        }
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(
        &self,
        exclusive: bool,
        op: impl FnOnce() -> Result<T, String>,
    ) -> Result<T, String> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create settings directory: {}", e))?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| format!("Failed to open settings lock file: {}", e))?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file)
                .map_err(|e| format!("Failed to lock settings file (exclusive): {}", e))?;
        } else {
            fs2::FileExt::lock_shared(&lock_file)
                .map_err(|e| format!("Failed to lock settings file (shared): {}", e))?;
        }

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    /// Get the settings file path
    pub fn settings_path(&self) -> &PathBuf {
        &self.settings_path
    }

    /// Load settings from disk, returning defaults if the file is missing or corrupt
    pub fn load(&self) -> AppSettings {
        let result = self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(AppSettings::default());
            }

            let content = fs::read_to_string(&self.settings_path)
                .map_err(|e| format!("Failed to read settings file: {}", e))?;

            let mut settings = serde_json::from_str::<AppSettings>(&content)
                .map_err(|e| format!("Failed to parse settings file: {}", e))?;

            settings.normalize();
            Ok(settings)
        });

        match result {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                AppSettings::default()
            }
        }
    }

    /// Save settings to disk using atomic write (temp file + rename)
    pub fn save(&self, settings: &AppSettings) -> crate::core::CoreResult<AppSettings> {
        self.with_lock(true, || {
            let mut normalized = settings.clone();
            normalized.normalize();

            let content = serde_json::to_string_pretty(&normalized)
                .map_err(|e| format!("Failed to serialize settings: {}", e))?;

            let temp_path = self.settings_path.with_extension("json.tmp");
            if temp_path.exists() {
                let _ = fs::remove_file(&temp_path);
            }

            let mut file = fs::File::create(&temp_path)
                .map_err(|e| format!("Failed to create temp settings file: {}", e))?;
            file.write_all(content.as_bytes())
                .map_err(|e| format!("Failed to write settings: {}", e))?;
            file.sync_all()
                .map_err(|e| format!("Failed to sync settings file: {}", e))?;

            if cfg!(windows) && self.settings_path.exists() {
                // rename does not overwrite on Windows
                fs::remove_file(&self.settings_path)
                    .map_err(|e| format!("Failed to replace settings file: {}", e))?;
            }
            fs::rename(&temp_path, &self.settings_path)
                .map_err(|e| format!("Failed to finalize settings file: {}", e))?;

            info!("Settings saved to {:?}", self.settings_path);
            Ok(normalized)
        })
        .map_err(crate::core::CoreError::Settings)
    }

    /// Reset settings to defaults and delete the settings file
    pub fn reset(&self) -> crate::core::CoreResult<AppSettings> {
        self.with_lock(true, || {
            if self.settings_path.exists() {
                fs::remove_file(&self.settings_path)
                    .map_err(|e| format!("Failed to delete settings file: {}", e))?;
                info!("Settings file deleted");
            }
            Ok(AppSettings::default())
        })
        .map_err(crate::core::CoreError::Settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_option_enums_parse_from_names() {
        assert_eq!("HEVC".parse::<VideoCodec>(), Ok(VideoCodec::Hevc));
        assert_eq!("h265".parse::<VideoCodec>(), Ok(VideoCodec::Hevc));
        assert_eq!("qsv".parse::<HardwareEncoder>(), Ok(HardwareEncoder::Qsv));
        assert_eq!("p7".parse::<EncoderPreset>(), Ok(EncoderPreset::P7));
        assert_eq!("vbr_hq".parse::<RateControlMode>(), Ok(RateControlMode::VbrHq));
        assert_eq!("Ultra".parse::<QualityPreset>(), Ok(QualityPreset::Ultra));

        let err = "vp9".parse::<VideoCodec>().unwrap_err();
        assert_eq!(err, "Unknown codec: vp9");
    }

    #[test]
    fn test_default_encoding_settings() {
        let settings = EncodingSettings::default();
        assert_eq!(settings.bitrate, "2400k");
        assert!(!settings.acceleration_enabled);
        assert!(!settings.decode_acceleration);
        assert_eq!(settings.codec, VideoCodec::H264);
        assert_eq!(settings.encoder_preset, EncoderPreset::P4);
        assert_eq!(settings.rate_control_mode, RateControlMode::VbrHq);
        assert_eq!(settings.quality_param, 19);
        assert!(settings.spatial_aq);
        assert!(settings.temporal_aq);
        assert_eq!(settings.lookahead, 20);
        assert_eq!(settings.scale(), None);
    }

    #[test]
    fn test_patch_merges_only_given_fields() {
        let mut settings = EncodingSettings::default();
        let patch: EncodingSettingsPatch = serde_json::from_str(
            r#"{ "bitrate": "6000k", "accelerationEnabled": true, "rateControlMode": "cbr" }"#,
        )
        .unwrap();

        settings.apply(&patch);

        assert_eq!(settings.bitrate, "6000k");
        assert!(settings.acceleration_enabled);
        assert_eq!(settings.rate_control_mode, RateControlMode::Cbr);
        // Untouched fields keep their values
        assert_eq!(settings.quality_param, 19);
        assert_eq!(settings.lookahead, 20);
    }

    #[test]
    fn test_patch_scale_null_clears() {
        let mut settings = EncodingSettings {
            scale_width: Some(1280),
            scale_height: Some(720),
            ..Default::default()
        };

        let absent: EncodingSettingsPatch = serde_json::from_str(r#"{ "lookahead": 8 }"#).unwrap();
        settings.apply(&absent);
        assert_eq!(settings.scale(), Some((1280, 720)));

        let cleared: EncodingSettingsPatch =
            serde_json::from_str(r#"{ "scaleWidth": null, "scaleHeight": null }"#).unwrap();
        settings.apply(&cleared);
        assert_eq!(settings.scale(), None);
    }

    #[test]
    fn test_normalize_clamps_values() {
        let mut settings = EncodingSettings {
            bitrate: "  ".to_string(),
            quality_param: 90,
            lookahead: 400,
            scale_width: Some(1920),
            scale_height: None,
            ..Default::default()
        };
        settings.normalize();

        assert_eq!(settings.bitrate, DEFAULT_BITRATE);
        assert_eq!(settings.quality_param, 51);
        assert_eq!(settings.lookahead, 32);
        assert_eq!(settings.scale_width, None);
    }

    #[test]
    fn test_normalize_rejects_bitrate_with_spaces_inside() {
        let mut settings = EncodingSettings {
            bitrate: "24 00k".to_string(),
            ..Default::default()
        };
        settings.normalize();
        assert_eq!(settings.bitrate, DEFAULT_BITRATE);
    }

    #[test]
    fn test_enum_serialization() {
        assert_eq!(serde_json::to_string(&RateControlMode::VbrHq).unwrap(), "\"vbr_hq\"");
        assert_eq!(serde_json::to_string(&EncoderPreset::P7).unwrap(), "\"p7\"");
        assert_eq!(serde_json::to_string(&VideoCodec::Hevc).unwrap(), "\"hevc\"");
        assert_eq!(serde_json::to_string(&HardwareEncoder::Qsv).unwrap(), "\"qsv\"");
    }

    #[test]
    fn test_quality_presets() {
        assert_eq!(QualityPreset::Ultra.bitrate(), Some("6000k"));
        assert_eq!(QualityPreset::Low.bitrate(), Some("1200k"));
        assert_eq!(QualityPreset::Custom.bitrate(), None);

        let patch = EncodingSettingsPatch::from_quality_preset(QualityPreset::High);
        assert_eq!(patch.bitrate.as_deref(), Some("4000k"));
        assert!(patch.codec.is_none());
    }

    #[test]
    fn test_hardware_encoder_names() {
        assert_eq!(HardwareEncoder::Nvenc.encoder_name(VideoCodec::H264), "h264_nvenc");
        assert_eq!(HardwareEncoder::Amf.encoder_name(VideoCodec::Hevc), "hevc_amf");
        assert_eq!(HardwareEncoder::Qsv.decode_accel(), "qsv");
        assert_eq!(HardwareEncoder::Nvenc.decode_accel(), "d3d11va");
    }

    #[test]
    fn test_default_output_path_next_to_video() {
        let output = OutputSettings::default();
        let path = output.default_output_path(Path::new("/media/show/ep01.mkv"));
        assert_eq!(path, PathBuf::from("/media/show/ep01_hardsub.mp4"));
    }

    #[test]
    fn test_default_output_path_custom_directory() {
        let output = OutputSettings {
            default_directory: Some(PathBuf::from("/out")),
            suffix: "_pl".to_string(),
            container: "mkv".to_string(),
        };
        let path = output.default_output_path(Path::new("/media/ep01.mkv"));
        assert_eq!(path, PathBuf::from("/out/ep01_pl.mkv"));
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(temp_dir.path().to_path_buf());

        let settings = manager.load();
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(temp_dir.path().to_path_buf());

        let mut settings = AppSettings::default();
        settings.encoding.bitrate = "4000k".to_string();
        settings.encoding.codec = VideoCodec::Hevc;
        settings.output.suffix = "_subbed".to_string();

        manager.save(&settings).unwrap();
        let loaded = manager.load();

        assert_eq!(loaded.encoding.bitrate, "4000k");
        assert_eq!(loaded.encoding.codec, VideoCodec::Hevc);
        assert_eq!(loaded.output.suffix, "_subbed");
        assert!(!temp_dir.path().join("settings.json.tmp").exists());
    }

    #[test]
    fn test_save_overwrites_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(temp_dir.path().to_path_buf());

        let mut settings = AppSettings::default();
        manager.save(&settings).unwrap();
        settings.encoding.lookahead = 4;
        manager.save(&settings).unwrap();

        assert_eq!(manager.load().encoding.lookahead, 4);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(SETTINGS_FILE), "{ not json").unwrap();

        let manager = SettingsManager::new(temp_dir.path().to_path_buf());
        assert_eq!(manager.load(), AppSettings::default());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(SETTINGS_FILE),
            r#"{ "version": 1, "encoding": { "bitrate": "1200k", "qualityParam": 70 } }"#,
        )
        .unwrap();

        let manager = SettingsManager::new(temp_dir.path().to_path_buf());
        let settings = manager.load();

        assert_eq!(settings.encoding.bitrate, "1200k");
        // Normalized on load
        assert_eq!(settings.encoding.quality_param, 51);
        assert_eq!(settings.encoding.lookahead, 20);
        assert_eq!(settings.output, OutputSettings::default());
    }

    #[test]
    fn test_reset_deletes_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(temp_dir.path().to_path_buf());

        manager.save(&AppSettings::default()).unwrap();
        assert!(manager.settings_path().exists());

        let settings = manager.reset().unwrap();
        assert!(!manager.settings_path().exists());
        assert_eq!(settings, AppSettings::default());
    }
}
