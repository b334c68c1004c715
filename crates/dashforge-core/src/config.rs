//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries the
//! tool locations and encoding policy. Every section defaults sensibly so a
//! completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::media::{Quality, HW_ACCEL_METHODS};

/// Default crush tolerance: rungs at or above 95% of the source bitrate are
/// considered not worth encoding.
pub const DEFAULT_CRUSH_TOLERANCE: f64 = 0.95;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub encoding: EncodingConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let tolerance = self.encoding.crush_tolerance;
        if !(tolerance > 0.0 && tolerance <= 1.0) {
            warnings.push(format!(
                "encoding.crush_tolerance {tolerance} is outside (0, 1]; crushing will behave oddly"
            ));
        }

        if let Some(ref dir) = self.encoding.working_directory {
            if !dir.is_dir() {
                warnings.push(format!(
                    "encoding.working_directory {} does not exist",
                    dir.display()
                ));
            }
        }

        let mut seen = HashSet::new();
        for (i, quality) in self.encoding.ladder.iter().enumerate() {
            if !seen.insert(quality.bitrate) {
                warnings.push(format!(
                    "encoding.ladder[{i}] repeats bitrate {}k",
                    quality.bitrate
                ));
            }
        }

        if let Some(ref hw) = self.encoding.hw_accel {
            if !HW_ACCEL_METHODS.contains(&hw.as_str()) {
                warnings.push(format!(
                    "encoding.hw_accel '{}' is not a recognized method (valid: {})",
                    hw,
                    HW_ACCEL_METHODS.join(", ")
                ));
            }
        }

        for (name, path) in [
            ("ffmpeg_path", &self.tools.ffmpeg_path),
            ("ffprobe_path", &self.tools.ffprobe_path),
            ("mp4box_path", &self.tools.mp4box_path),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!(
                        "tools.{name} {} does not exist; PATH lookup will be used",
                        p.display()
                    ));
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Custom paths for external tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub mp4box_path: Option<PathBuf>,
    /// Upper bound on a single tool invocation; unbounded when unset.
    pub timeout_secs: Option<u64>,
}

/// Encoding policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Directory for intermediate transcoder outputs.
    pub working_directory: Option<PathBuf>,
    /// Bypass quality-ladder crushing entirely.
    pub disable_quality_crushing: bool,
    /// Stream-copy the source for the copy-sentinel rung instead of re-encoding.
    pub enable_stream_copying: bool,
    /// Fraction of the source bitrate a rung must stay below to be kept.
    pub crush_tolerance: f64,
    /// Hardware acceleration method applied when the caller does not choose one.
    pub hw_accel: Option<String>,
    /// Ladder used when the caller does not supply one.
    pub ladder: Vec<Quality>,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            working_directory: None,
            disable_quality_crushing: false,
            enable_stream_copying: false,
            crush_tolerance: DEFAULT_CRUSH_TOLERANCE,
            hw_accel: None,
            ladder: Vec::new(),
        }
    }
}

impl EncodingConfig {
    /// The working directory, falling back to the system temp directory.
    pub fn working_directory(&self) -> PathBuf {
        self.working_directory
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
