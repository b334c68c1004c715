//! Media-domain types shared between planning, execution, and packaging.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// StreamType
// ---------------------------------------------------------------------------

/// Logical type of a produced (or to-be-produced) stream file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Video,
    Audio,
    Subtitle,
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamType::Video => write!(f, "video"),
            StreamType::Audio => write!(f, "audio"),
            StreamType::Subtitle => write!(f, "subtitle"),
        }
    }
}

// ---------------------------------------------------------------------------
// Quality
// ---------------------------------------------------------------------------

/// One rung of a quality ladder.
///
/// A quality is identified by its bitrate alone: two qualities with the same
/// bitrate compare equal regardless of their encode parameters. Bitrate `0`
/// is reserved for the stream-copy sentinel (see [`Quality::copy`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quality {
    /// Output width in pixels; `0` keeps the source width.
    #[serde(default)]
    pub width: u32,
    /// Output height in pixels; `0` keeps the source height.
    #[serde(default)]
    pub height: u32,
    /// Target video bitrate in kb/s.
    pub bitrate: u32,
    /// Encoder preset (e.g. "medium", "slow").
    #[serde(default = "default_preset")]
    pub preset: String,
    /// Optional encoder profile (e.g. "high").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Optional encoder level (e.g. "4.1").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Optional output pixel format (e.g. "yuv420p").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_format: Option<String>,
}

fn default_preset() -> String {
    "medium".to_string()
}

impl Quality {
    /// Bitrate value reserved for the stream-copy sentinel.
    pub const COPY_BITRATE: u32 = 0;

    /// Create a quality with the default preset.
    pub fn new(width: u32, height: u32, bitrate: u32) -> Self {
        Self {
            width,
            height,
            bitrate,
            preset: default_preset(),
            profile: None,
            level: None,
            pixel_format: None,
        }
    }

    /// The stream-copy sentinel: "no re-encode, keep the source".
    pub fn copy() -> Self {
        Self {
            preset: String::new(),
            ..Self::new(0, 0, Self::COPY_BITRATE)
        }
    }

    /// Builder: set the encoder preset.
    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    /// Whether this is the stream-copy sentinel.
    pub fn is_copy(&self) -> bool {
        self.bitrate == Self::COPY_BITRATE
    }

    /// Whether an explicit output resolution was requested.
    pub fn has_resolution(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl PartialEq for Quality {
    fn eq(&self, other: &Self) -> bool {
        self.bitrate == other.bitrate
    }
}

impl Eq for Quality {}

impl Hash for Quality {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bitrate.hash(state);
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_copy() {
            return write!(f, "copy");
        }
        if self.has_resolution() {
            write!(f, "{}x{}@", self.width, self.height)?;
        }
        write!(f, "{}k", self.bitrate)?;
        if !self.preset.is_empty() {
            write!(f, ":{}", self.preset)?;
        }
        Ok(())
    }
}

/// Parses `copy` or `[WIDTHxHEIGHT@]BITRATE[k][:PRESET]`.
///
/// ```
/// use dashforge_core::Quality;
///
/// let q: Quality = "1280x720@3000:slow".parse().unwrap();
/// assert_eq!((q.width, q.height, q.bitrate), (1280, 720, 3000));
/// assert_eq!(q.preset, "slow");
/// assert!("copy".parse::<Quality>().unwrap().is_copy());
/// ```
impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("copy") {
            return Ok(Quality::copy());
        }

        let invalid = || Error::Validation(format!("invalid quality '{s}'"));

        let (body, preset) = match s.split_once(':') {
            Some((body, preset)) if !preset.is_empty() => (body, Some(preset)),
            Some(_) => return Err(invalid()),
            None => (s, None),
        };

        let (resolution, bitrate) = match body.split_once('@') {
            Some((res, rate)) => (Some(res), rate),
            None => (None, body),
        };

        let bitrate: u32 = bitrate
            .trim_end_matches(['k', 'K'])
            .parse()
            .map_err(|_| invalid())?;

        let (width, height) = match resolution {
            Some(res) => {
                let (w, h) = res.split_once(['x', 'X']).ok_or_else(invalid)?;
                (
                    w.parse().map_err(|_| invalid())?,
                    h.parse().map_err(|_| invalid())?,
                )
            }
            None => (0, 0),
        };

        let mut quality = Quality::new(width, height, bitrate);
        if let Some(preset) = preset {
            quality.preset = preset.to_string();
        }
        Ok(quality)
    }
}

// ---------------------------------------------------------------------------
// StreamFile
// ---------------------------------------------------------------------------

/// A file produced (or to be produced) by one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFile {
    /// Location of the file. Changes once when a subtitle is relocated into
    /// the output directory.
    pub path: PathBuf,
    /// Logical stream type.
    pub stream_type: StreamType,
    /// Optional label; for subtitles this is the language tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl StreamFile {
    /// Create a stream file without a label.
    pub fn new(path: impl Into<PathBuf>, stream_type: StreamType) -> Self {
        Self {
            path: path.into(),
            stream_type,
            name: None,
        }
    }

    /// Builder: attach a label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Final path component as a string (used as a manifest base URL).
    pub fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
    }

    /// Return a copy of this file located at `path`.
    pub fn moved_to(&self, path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// EncodeOptions
// ---------------------------------------------------------------------------

/// Encoder settings applied to every rung of the ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// Video encoder used when no hardware acceleration is selected.
    pub video_codec: String,
    /// Audio encoder.
    pub audio_codec: String,
    /// Audio bitrate in kb/s.
    pub audio_bitrate: u32,
    /// Downmix target channel count.
    pub audio_channels: Option<u8>,
    /// Hardware acceleration method (`videotoolbox`, `nvenc`, `vaapi`, `qsv`).
    pub hw_accel: Option<String>,
    /// Extra flags appended to every transcoder video output.
    pub additional_video_flags: Vec<String>,
    /// Extra flags appended to every transcoder audio output.
    pub additional_audio_flags: Vec<String>,
    /// Extra flags passed to the packager before its inputs.
    pub additional_packager_flags: Vec<String>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            video_codec: "libx264".into(),
            audio_codec: "aac".into(),
            audio_bitrate: 128,
            audio_channels: Some(2),
            hw_accel: None,
            additional_video_flags: Vec::new(),
            additional_audio_flags: Vec::new(),
            additional_packager_flags: Vec::new(),
        }
    }
}

/// Hardware acceleration methods understood by [`EncodeOptions::hw_accel`].
pub const HW_ACCEL_METHODS: &[&str] = &["none", "videotoolbox", "nvenc", "vaapi", "qsv"];
