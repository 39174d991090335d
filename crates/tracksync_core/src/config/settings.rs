//! Settings struct with TOML-based sections.
//!
//! Each section maps to a TOML table and can be updated independently.

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Output, temp and log directories.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Window sampling bounds.
    #[serde(default)]
    pub sampling: SamplingSettings,

    /// Correlation and classification settings.
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// External tool locations and limits.
    #[serde(default)]
    pub tools: ToolSettings,
}

impl Settings {
    /// Check for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        let s = &self.sampling;
        if s.min_samples < 3 {
            return Err(format!(
                "sampling.min_samples must be at least 3 (got {})",
                s.min_samples
            ));
        }
        if s.min_samples > s.max_samples {
            return Err(format!(
                "sampling.min_samples ({}) exceeds sampling.max_samples ({})",
                s.min_samples, s.max_samples
            ));
        }
        if s.min_window_secs == 0 {
            return Err("sampling.min_window_secs must be positive".to_string());
        }
        if s.min_window_secs > s.max_window_secs {
            return Err(format!(
                "sampling.min_window_secs ({}) exceeds sampling.max_window_secs ({})",
                s.min_window_secs, s.max_window_secs
            ));
        }

        let a = &self.analysis;
        if a.sample_rate == 0 {
            return Err("analysis.sample_rate must be positive".to_string());
        }
        if !(a.warp_threshold_ms > 0.0) {
            return Err("analysis.warp_threshold_ms must be positive".to_string());
        }
        if !(a.max_duration_diff_secs > 0.0) {
            return Err("analysis.max_duration_diff_secs must be positive".to_string());
        }

        if self.tools.timeout_secs == 0 {
            return Err("tools.timeout_secs must be positive".to_string());
        }

        Ok(())
    }
}

/// Path configuration for output, temp, and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Output folder for muxed files and extracted tracks.
    #[serde(default = "default_output_folder")]
    pub output_folder: String,

    /// Root folder for temporary segment files.
    #[serde(default = "default_temp_root")]
    pub temp_root: String,

    /// Folder for per-run log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,
}

fn default_output_folder() -> String {
    "sync_output".to_string()
}

fn default_temp_root() -> String {
    ".temp".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            output_folder: default_output_folder(),
            temp_root: default_temp_root(),
            logs_folder: default_logs_folder(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when RUST_LOG is not set.
    #[serde(default)]
    pub level: LogLevel,

    /// Keep external tool output in the tail buffer only.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of tool output lines kept for error diagnosis.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Prefix run log lines with a timestamp.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            compact: true,
            error_tail: default_error_tail(),
            show_timestamps: true,
        }
    }
}

/// Bounds for the randomised sampling windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingSettings {
    /// Minimum number of windows per run.
    #[serde(default = "default_min_samples")]
    pub min_samples: u32,

    /// Maximum number of windows per run.
    #[serde(default = "default_max_samples")]
    pub max_samples: u32,

    /// Shortest window in seconds.
    #[serde(default = "default_min_window_secs")]
    pub min_window_secs: u32,

    /// Longest window in seconds.
    #[serde(default = "default_max_window_secs")]
    pub max_window_secs: u32,

    /// Fixed seed for reproducible runs; entropy when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_min_samples() -> u32 {
    5
}

fn default_max_samples() -> u32 {
    10
}

fn default_min_window_secs() -> u32 {
    20
}

fn default_max_window_secs() -> u32 {
    60
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            max_samples: default_max_samples(),
            min_window_secs: default_min_window_secs(),
            max_window_secs: default_max_window_secs(),
            seed: None,
        }
    }
}

/// Correlation and classification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Sample rate segments are resampled to (Hz).
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Trimmed standard deviation above which a pair is classified warped.
    #[serde(default = "default_warp_threshold_ms")]
    pub warp_threshold_ms: f64,

    /// Duration difference above which no estimate is attempted.
    #[serde(default = "default_max_duration_diff_secs")]
    pub max_duration_diff_secs: f64,

    /// Process windows on a worker pool.
    #[serde(default)]
    pub parallel_windows: bool,

    /// Worker threads for parallel windows (0 = one per core).
    #[serde(default)]
    pub worker_threads: usize,
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_warp_threshold_ms() -> f64 {
    100.0
}

fn default_max_duration_diff_secs() -> f64 {
    15.0 * 60.0
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            warp_threshold_ms: default_warp_threshold_ms(),
            max_duration_diff_secs: default_max_duration_diff_secs(),
            parallel_windows: false,
            worker_threads: 0,
        }
    }
}

/// External tool overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffprobe_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mkvmerge_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mkvextract_path: Option<String>,

    /// Seconds before an external tool is killed.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            mkvmerge_path: None,
            mkvextract_path: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Paths,
    Logging,
    Sampling,
    Analysis,
    Tools,
}

impl ConfigSection {
    /// All sections in file order.
    pub const ALL: [ConfigSection; 5] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Sampling,
        ConfigSection::Analysis,
        ConfigSection::Tools,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Sampling => "sampling",
            ConfigSection::Analysis => "analysis",
            ConfigSection::Tools => "tools",
        }
    }

    /// Comment written above the section.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Output and working directories",
            ConfigSection::Logging => "Logging configuration",
            ConfigSection::Sampling => "Sampling windows (counts and lengths in seconds)",
            ConfigSection::Analysis => "Correlation and warp detection",
            ConfigSection::Tools => "External tools (paths default to PATH lookup)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_serializes() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[sampling]"));
        assert!(toml.contains("warp_threshold_ms"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[sampling]\nmin_samples = 6\nseed = 42";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        assert_eq!(parsed.sampling.min_samples, 6);
        assert_eq!(parsed.sampling.seed, Some(42));
        assert_eq!(parsed.sampling.max_samples, 10);
        assert_eq!(parsed.analysis.sample_rate, 16000);
        assert_eq!(parsed.analysis.max_duration_diff_secs, 900.0);
    }

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_too_few_samples() {
        let mut settings = Settings::default();
        settings.sampling.min_samples = 2;
        assert!(settings.validate().unwrap_err().contains("min_samples"));
    }

    #[test]
    fn validate_rejects_inverted_windows() {
        let mut settings = Settings::default();
        settings.sampling.min_window_secs = 90;
        assert!(settings.validate().unwrap_err().contains("min_window_secs"));
    }

    #[test]
    fn validate_rejects_zero_threshold() {
        let mut settings = Settings::default();
        settings.analysis.warp_threshold_ms = 0.0;
        assert!(settings.validate().is_err());
    }
}
