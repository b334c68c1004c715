//! External tool detection and management.
//!
//! The [`ToolRegistry`] discovers and caches the locations of the CLI tools
//! the packager drives (ffmpeg, ffprobe, MP4Box) and provides lookup methods
//! for the rest of the workspace.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dashforge_core::config::ToolsConfig;
use dashforge_core::{Error, Result};
use serde::{Deserialize, Serialize};

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";
pub const MP4BOX: &str = "MP4Box";

/// Known tool names that the registry manages.
pub const KNOWN_TOOLS: &[&str] = &[FFMPEG, FFPROBE, MP4BOX];

/// Location of a single external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Tool name as listed in [`KNOWN_TOOLS`].
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of the tool's version banner, if it could be read.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool locations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
    timeout: Option<Duration>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// A configured path is used only if it exists; otherwise the tool is
    /// looked up with [`which::which`]. Tools that are not found are omitted
    /// and surface later through [`ToolRegistry::require`].
    pub fn discover(tools_config: &ToolsConfig) -> Self {
        let mut registry = Self {
            timeout: tools_config.timeout_secs.map(Duration::from_secs),
            ..Self::default()
        };

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                FFMPEG => tools_config.ffmpeg_path.as_deref(),
                FFPROBE => tools_config.ffprobe_path.as_deref(),
                MP4BOX => tools_config.mp4box_path.as_deref(),
                _ => None,
            };

            let resolved = match custom_path {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(
                        "configured {name} path {} does not exist, searching PATH",
                        p.display()
                    );
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            match resolved {
                Some(path) => {
                    tracing::debug!("found {name} at {}", path.display());
                    registry = registry.with_tool(name, path);
                }
                None => tracing::debug!("{name} not found"),
            }
        }

        registry
    }

    /// A registry with no tools; populate it with [`ToolRegistry::with_tool`].
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder: register `name` at `path` without touching the filesystem.
    pub fn with_tool(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.tools.insert(
            name.to_string(),
            ToolConfig {
                name: name.to_string(),
                path: path.into(),
            },
        );
        self
    }

    /// Builder: set the per-invocation timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Per-invocation timeout configured for these tools.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Return the [`ToolConfig`] for the given tool, or an [`Error::Tool`] if
    /// the tool was not found during discovery.
    pub fn require(&self, name: &str) -> Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| {
            Error::tool(name, format!("{name} not found; is it installed and in PATH?"))
        })
    }

    /// Shorthand for the resolved path of a required tool.
    pub fn path(&self, name: &str) -> Result<&Path> {
        self.require(name).map(|t| t.path.as_path())
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(cfg) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(&cfg.path),
                    path: Some(cfg.path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }

    /// Iterate over all registered tool configs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ToolConfig)> {
        self.tools.iter()
    }
}

/// Run `<tool> -version` and return the first non-empty line.
///
/// MP4Box prints its banner on stderr, the ffmpeg family on stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    let first_line = |bytes: &[u8]| {
        String::from_utf8_lossy(bytes)
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
    };

    first_line(&output.stdout).or_else(|| first_line(&output.stderr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_with_default_config() {
        let registry = ToolRegistry::discover(&ToolsConfig::default());
        // Nothing is guaranteed to be installed; the call must not panic.
        let _ = registry.check_all();
        assert_eq!(registry.timeout(), None);
    }

    #[test]
    fn discover_carries_timeout() {
        let cfg = ToolsConfig {
            timeout_secs: Some(90),
            ..ToolsConfig::default()
        };
        let registry = ToolRegistry::discover(&cfg);
        assert_eq!(registry.timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn configured_path_wins_when_it_exists() {
        let fake = tempfile::NamedTempFile::new().unwrap();
        let cfg = ToolsConfig {
            mp4box_path: Some(fake.path().to_path_buf()),
            ..ToolsConfig::default()
        };
        let registry = ToolRegistry::discover(&cfg);
        assert_eq!(registry.path(MP4BOX).unwrap(), fake.path());
    }

    #[test]
    fn require_missing_tool_returns_error() {
        let registry = ToolRegistry::empty();
        let err = registry.require(MP4BOX).unwrap_err();
        assert!(matches!(err, Error::Tool { ref tool, .. } if tool == "MP4Box"));
    }

    #[test]
    fn with_tool_registers_path() {
        let registry = ToolRegistry::empty().with_tool(FFMPEG, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(
            registry.path(FFMPEG).unwrap(),
            Path::new("/opt/ffmpeg/bin/ffmpeg")
        );
        assert!(registry.require(FFPROBE).is_err());
        assert_eq!(registry.iter().count(), 1);
    }

    #[test]
    fn check_all_returns_known_tools() {
        let infos = ToolRegistry::empty().check_all();
        let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["ffmpeg", "ffprobe", "MP4Box"]);
        assert!(infos.iter().all(|i| !i.available && i.path.is_none()));
    }

    #[test]
    fn tool_info_serialization() {
        let info = ToolInfo {
            name: MP4BOX.to_string(),
            available: true,
            version: Some("MP4Box - GPAC version 2.2".to_string()),
            path: Some(PathBuf::from("/usr/bin/MP4Box")),
        };
        let json = serde_json::to_string(&info).unwrap();
        let back: ToolInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "MP4Box");
        assert!(back.available);
    }
}
