//! FFprobe-based [`Prober`] implementation.
//!
//! Runs `ffprobe -v quiet -print_format json -show_format -show_streams`
//! through a [`ProcessRunner`] and parses the JSON into a [`ProbeDocument`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashforge_core::{Error, Result};

use super::{ProbeDocument, Prober};
use crate::command::ProcessRunner;

/// A prober backed by the `ffprobe` CLI.
#[derive(Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
    runner: Arc<dyn ProcessRunner>,
}

impl std::fmt::Debug for FfprobeProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfprobeProber")
            .field("ffprobe_path", &self.ffprobe_path)
            .finish_non_exhaustive()
    }
}

impl FfprobeProber {
    /// Create a prober running `ffprobe_path` through `runner`.
    pub fn new(ffprobe_path: PathBuf, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            ffprobe_path,
            runner,
        }
    }

    /// Argument list for probing `input`.
    pub fn probe_args(input: &Path) -> Vec<String> {
        vec![
            "-v".into(),
            "quiet".into(),
            "-print_format".into(),
            "json".into(),
            "-show_format".into(),
            "-show_streams".into(),
            input.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn probe(&self, path: &Path) -> Result<ProbeDocument> {
        let args = Self::probe_args(path);
        let mut json = String::new();

        let result = self
            .runner
            .run(
                &self.ffprobe_path,
                &args,
                &mut |line| {
                    json.push_str(line);
                    json.push('\n');
                },
                &mut |line| tracing::trace!(target: "dashforge::tool", "ffprobe: {line}"),
            )
            .await
            .map_err(|e| Error::Probe(format!("failed to run ffprobe: {e}")))?;

        if !result.success() {
            return Err(Error::Probe(format!(
                "ffprobe exited with code {} for {}",
                result.exit_code,
                path.display()
            )));
        }

        ProbeDocument::from_json(&json)
    }
}
