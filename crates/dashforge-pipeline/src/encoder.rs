//! End-to-end DASH generation.
//!
//! [`DashEncoder::generate_dash`] runs the stages in order:
//!
//! ```text
//! Validating -> Probing -> Planning -> Transcoding -> PackagingPrep
//!            -> Packaging -> PostProcessing -> Done
//! ```
//!
//! Bad requests and unreadable sources are returned as errors before anything
//! is written. A failing transcoder or packager is expected in normal
//! operation, so those failures are logged, the files they may have left
//! behind are removed, and the call returns `Ok(None)`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use dashforge_av::tools::{FFMPEG, FFPROBE, MP4BOX};
use dashforge_av::{
    relocate, remove_best_effort, ExecutionResult, FfprobeProber, ProcessRunner, Prober,
    TokioProcessRunner, ToolRegistry, Workspace,
};
use dashforge_core::config::EncodingConfig;
use dashforge_core::{EncodeOptions, Error, Quality, Result, StreamFile};
use dashforge_mpd::Manifest;

use crate::ladder::{crush, sort_descending, validate_ladder};
use crate::metadata::SourceMetadata;
use crate::plan::{resolve_timing, PackagePlan, TranscodeParams, TranscodePlan};
use crate::postprocess::process_manifest_file;
use crate::progress::ProgressTracker;
use crate::sink::{DiagnosticSink, ProgressSink, TracingDiagnostics};

/// Pipeline stage, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Probing,
    Planning,
    Transcoding,
    PackagingPrep,
    Packaging,
    PostProcessing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Probing => "probing",
            Stage::Planning => "planning",
            Stage::Transcoding => "transcoding",
            Stage::PackagingPrep => "packaging prep",
            Stage::Packaging => "packaging",
            Stage::PostProcessing => "post-processing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One GenerateDash request.
#[derive(Debug, Clone)]
pub struct DashRequest {
    pub input: PathBuf,
    /// Base name of every produced file; the manifest is `{base_name}.mpd`.
    pub base_name: String,
    /// Output frame rate; `0` uses the source's rounded frame rate.
    pub framerate: u32,
    /// Keyframe interval in frames; `0` uses three times the frame rate.
    pub keyframe_interval: u32,
    pub qualities: Vec<Quality>,
    pub options: EncodeOptions,
    pub output_dir: PathBuf,
}

impl DashRequest {
    pub fn new(
        input: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        base_name: impl Into<String>,
        qualities: Vec<Quality>,
    ) -> Self {
        Self {
            input: input.into(),
            base_name: base_name.into(),
            framerate: 0,
            keyframe_interval: 0,
            qualities,
            options: EncodeOptions::default(),
            output_dir: output_dir.into(),
        }
    }

    /// Builder: set frame rate and keyframe interval.
    pub fn with_timing(mut self, framerate: u32, keyframe_interval: u32) -> Self {
        self.framerate = framerate;
        self.keyframe_interval = keyframe_interval;
        self
    }

    /// Builder: set encoder options.
    pub fn with_options(mut self, options: EncodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Path the manifest is written to.
    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.mpd", self.base_name))
    }

    fn validate(&self) -> Result<()> {
        if !self.input.is_file() {
            return Err(Error::Validation(format!(
                "input file {} does not exist",
                self.input.display()
            )));
        }
        if !self.output_dir.is_dir() {
            return Err(Error::Validation(format!(
                "output directory {} does not exist",
                self.output_dir.display()
            )));
        }
        let name = self.base_name.trim();
        if name.is_empty() {
            return Err(Error::Validation("output name is empty".to_string()));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::Validation(format!(
                "output name '{}' must be a plain file name",
                self.base_name
            )));
        }
        validate_ladder(&self.qualities)
    }
}

/// A completed DASH package.
#[derive(Debug, Clone)]
pub struct DashEncodeResult {
    /// The post-processed manifest, as written to `manifest_path`.
    pub manifest: Manifest,
    /// Container tags of the source, keys lower-cased.
    pub source_tags: BTreeMap<String, String>,
    /// Source duration in seconds.
    pub duration: f64,
    pub manifest_path: PathBuf,
}

/// Drives ffmpeg and MP4Box to turn one input into a DASH package.
///
/// Holds only read-only configuration and shared collaborators, so one
/// encoder can serve concurrent requests that target distinct output
/// directories.
pub struct DashEncoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    mp4box: PathBuf,
    config: EncodingConfig,
    runner: Arc<dyn ProcessRunner>,
    prober: Arc<dyn Prober>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl fmt::Debug for DashEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashEncoder")
            .field("ffmpeg", &self.ffmpeg)
            .field("ffprobe", &self.ffprobe)
            .field("mp4box", &self.mp4box)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DashEncoder {
    /// Create an encoder from discovered tools.
    ///
    /// Fails with [`Error::Tool`] if ffmpeg, ffprobe, or MP4Box is missing.
    pub fn new(tools: &ToolRegistry, config: EncodingConfig) -> Result<Self> {
        let ffmpeg = tools.path(FFMPEG)?.to_path_buf();
        let ffprobe = tools.path(FFPROBE)?.to_path_buf();
        let mp4box = tools.path(MP4BOX)?.to_path_buf();

        let runner: Arc<dyn ProcessRunner> =
            Arc::new(TokioProcessRunner::new().with_timeout(tools.timeout()));
        let prober = Arc::new(FfprobeProber::new(ffprobe.clone(), Arc::clone(&runner)));

        Ok(Self {
            ffmpeg,
            ffprobe,
            mp4box,
            config,
            runner,
            prober,
            diagnostics: Arc::new(TracingDiagnostics),
        })
    }

    /// Builder: run tools through `runner`. The ffprobe prober is rebuilt on
    /// top of it.
    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.prober = Arc::new(FfprobeProber::new(self.ffprobe.clone(), Arc::clone(&runner)));
        self.runner = runner;
        self
    }

    /// Builder: replace the prober.
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    /// Builder: send non-progress tool output to `diagnostics`.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn config(&self) -> &EncodingConfig {
        &self.config
    }

    /// Probe `input` and interpret the result.
    pub async fn probe(&self, input: &Path) -> Result<SourceMetadata> {
        let doc = self.prober.probe(input).await?;
        SourceMetadata::from_probe(&doc)
    }

    /// Generate a DASH package for `request`.
    ///
    /// Returns `Ok(None)` when the transcoder or packager fails; see the
    /// module documentation for the error policy.
    pub async fn generate_dash(
        &self,
        request: &DashRequest,
        progress: &dyn ProgressSink,
    ) -> Result<Option<DashEncodeResult>> {
        enter(Stage::Validating, &request.base_name);
        request.validate()?;

        enter(Stage::Probing, &request.base_name);
        let source = self.probe(&request.input).await?;
        tracing::debug!(
            "source: {} kb/s, {:.3}s, {:.3} fps",
            source.bitrate_kbps,
            source.duration,
            source.framerate
        );

        enter(Stage::Planning, &request.base_name);
        let timing = resolve_timing(request.framerate, request.keyframe_interval, &source);
        let mut ladder = if self.config.disable_quality_crushing {
            request.qualities.clone()
        } else {
            crush(
                &request.qualities,
                source.bitrate_kbps,
                self.config.crush_tolerance,
            )
        };
        sort_descending(&mut ladder);
        tracing::info!(
            "ladder: {}",
            ladder
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut options = request.options.clone();
        if options.hw_accel.is_none() {
            options.hw_accel = self.config.hw_accel.clone();
        }

        let workspace = Workspace::new_in(&self.config.working_directory())?;
        let transcode = TranscodePlan::build(&TranscodeParams {
            input: &request.input,
            work_dir: workspace.path(),
            base_name: &request.base_name,
            ladder: &ladder,
            source: &source,
            timing,
            options: &options,
            stream_copy: self.config.enable_stream_copying,
        });

        enter(Stage::Transcoding, &request.base_name);
        let tracker = ProgressTracker::new(source.duration, progress, self.diagnostics.as_ref());
        let transcoded = self
            .run_tool(FFMPEG, &self.ffmpeg, &transcode.args, Some(&tracker))
            .await;
        if !succeeded(&transcoded) {
            fail(Stage::Transcoding, FFMPEG, &transcoded);
            for file in &transcode.outputs {
                remove_best_effort(&file.path);
            }
            return Ok(None);
        }

        enter(Stage::PackagingPrep, &request.base_name);
        let (media, subtitles) = transcode.partition();
        let package = PackagePlan::build(
            media,
            request.manifest_path(),
            timing,
            &options.additional_packager_flags,
        );

        enter(Stage::Packaging, &request.base_name);
        let packaged = self
            .run_tool(MP4BOX, &self.mp4box, &package.args, None)
            .await;
        for file in &package.inputs {
            remove_best_effort(&file.path);
        }

        enter(Stage::PostProcessing, &request.base_name);
        let subtitles = relocate_subtitles(&subtitles, &request.output_dir);
        let cleanup = Cleanup {
            request,
            workspace: &workspace,
            packager_output: packaged
                .as_ref()
                .map(|r| r.output.as_slice())
                .unwrap_or_default(),
        };

        if !package.manifest_path.is_file() {
            tracing::error!(
                "[{}] packager did not produce {}",
                Stage::Failed,
                package.manifest_path.display()
            );
            cleanup.remove(&subtitles, &[]);
            return Ok(None);
        }

        let manifest = match process_manifest_file(&package.manifest_path, &subtitles) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::error!("[{}] manifest post-processing failed: {e}", Stage::Failed);
                cleanup.remove(&subtitles, &[package.manifest_path.clone()]);
                return Ok(None);
            }
        };

        if !succeeded(&packaged) {
            fail(Stage::Packaging, MP4BOX, &packaged);
            let mut produced = vec![package.manifest_path.clone()];
            produced.extend(
                manifest
                    .base_urls()
                    .iter()
                    .filter_map(|url| cleanup.segment_file(url)),
            );
            cleanup.remove(&subtitles, &produced);
            return Ok(None);
        }

        enter(Stage::Done, &request.base_name);
        Ok(Some(DashEncodeResult {
            manifest,
            source_tags: source.tags,
            duration: source.duration,
            manifest_path: package.manifest_path,
        }))
    }

    /// Run one tool, routing stdout to diagnostics and stderr through the
    /// progress tracker when one is given. A runner error is logged and
    /// reported as `None`.
    async fn run_tool(
        &self,
        name: &str,
        program: &Path,
        args: &[String],
        tracker: Option<&ProgressTracker<'_>>,
    ) -> Option<ExecutionResult> {
        tracing::debug!("{} {}", program.display(), args.join(" "));
        let diagnostics = self.diagnostics.as_ref();

        let result = self
            .runner
            .run(
                program,
                args,
                &mut |line| diagnostics.accept(line),
                &mut |line| match tracker {
                    Some(tracker) => tracker.observe(line),
                    None => diagnostics.accept(line),
                },
            )
            .await;

        match result {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::error!("{name} could not be run: {e}");
                None
            }
        }
    }
}

fn enter(stage: Stage, base_name: &str) {
    tracing::info!("[{base_name}] {stage}");
}

fn succeeded(result: &Option<ExecutionResult>) -> bool {
    result.as_ref().is_some_and(ExecutionResult::success)
}

fn fail(stage: Stage, tool: &str, result: &Option<ExecutionResult>) {
    match result {
        Some(r) => tracing::error!(
            "[{}] {tool} exited with code {} during {stage}",
            Stage::Failed,
            r.exit_code
        ),
        None => tracing::error!("[{}] {tool} did not complete during {stage}", Stage::Failed),
    }
}

/// Move subtitles into the output directory. A subtitle that cannot be moved
/// is logged, removed, and left out.
fn relocate_subtitles(subtitles: &[StreamFile], output_dir: &Path) -> Vec<StreamFile> {
    subtitles
        .iter()
        .filter_map(|subtitle| match relocate(subtitle, output_dir) {
            Ok(moved) => Some(moved),
            Err(e) => {
                tracing::warn!("failed to relocate {}: {e}", subtitle.path.display());
                remove_best_effort(&subtitle.path);
                None
            }
        })
        .collect()
}

/// Best-effort removal of what a failed packaging run left behind.
struct Cleanup<'a> {
    request: &'a DashRequest,
    workspace: &'a Workspace,
    packager_output: &'a [String],
}

impl Cleanup<'_> {
    fn remove(&self, subtitles: &[StreamFile], produced: &[PathBuf]) {
        for file in subtitles {
            remove_best_effort(&file.path);
        }
        for path in produced {
            remove_best_effort(path);
        }
        for path in self.referenced_files() {
            remove_best_effort(&path);
        }
    }

    /// Packager output lines that name a file this run may have created.
    ///
    /// Only files inside the output directory or the workspace qualify, and
    /// never the input itself.
    fn referenced_files(&self) -> Vec<PathBuf> {
        self.packager_output
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let path = Path::new(line);
                if path.is_absolute() {
                    normalize(path)
                } else {
                    normalize(&self.request.output_dir.join(path))
                }
            })
            .filter(|path| self.in_output_dir(path) || self.workspace.contains(path))
            .filter(|path| self.removable(path))
            .collect()
    }

    /// Resolve a manifest `BaseURL` to a segment file in the output directory.
    ///
    /// Absolute paths, URLs with a scheme, and anything that would climb out
    /// of the output directory are ignored.
    fn segment_file(&self, url: &str) -> Option<PathBuf> {
        let url = url.trim();
        if url.is_empty() || url.contains("://") {
            return None;
        }
        let relative = Path::new(url);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        let path = normalize(&self.request.output_dir.join(relative))?;
        (self.in_output_dir(&path) && self.removable(&path)).then_some(path)
    }

    fn in_output_dir(&self, path: &Path) -> bool {
        normalize(&self.request.output_dir).is_some_and(|dir| path.starts_with(dir))
    }

    fn removable(&self, path: &Path) -> bool {
        path.is_file() && !same_file(path, &self.request.input)
    }
}

/// Lexically resolve `.` and `..` components. Leading `..` of a relative
/// path is kept; `None` means the path climbs above the filesystem root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                None | Some(Component::ParentDir) => out.push(".."),
                Some(_) => return None,
            },
            other => out.push(other),
        }
    }
    Some(out)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_display() {
        assert_eq!(Stage::PackagingPrep.to_string(), "packaging prep");
        assert_eq!(Stage::PostProcessing.to_string(), "post-processing");
        assert_eq!(Stage::Failed.to_string(), "failed");
    }

    #[test]
    fn request_defaults() {
        let req = DashRequest::new("/in.mkv", "/out", "movie", vec![Quality::new(0, 0, 800)]);
        assert_eq!(req.framerate, 0);
        assert_eq!(req.keyframe_interval, 0);
        assert_eq!(req.manifest_path(), PathBuf::from("/out/movie.mpd"));
        let req = req.with_timing(25, 50);
        assert_eq!((req.framerate, req.keyframe_interval), (25, 50));
    }

    #[test]
    fn validation_rules() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mkv");
        std::fs::write(&input, b"x").unwrap();
        let ladder = vec![Quality::new(0, 0, 800)];

        let ok = DashRequest::new(&input, dir.path(), "movie", ladder.clone());
        assert!(ok.validate().is_ok());

        let cases = [
            DashRequest::new(dir.path().join("missing.mkv"), dir.path(), "movie", ladder.clone()),
            DashRequest::new(&input, dir.path().join("nope"), "movie", ladder.clone()),
            DashRequest::new(&input, dir.path(), "  ", ladder.clone()),
            DashRequest::new(&input, dir.path(), "../movie", ladder.clone()),
            DashRequest::new(&input, dir.path(), "movie", vec![]),
            DashRequest::new(
                &input,
                dir.path(),
                "movie",
                vec![Quality::new(0, 0, 100), Quality::new(640, 360, 100)],
            ),
        ];
        for req in cases {
            assert!(matches!(req.validate(), Err(Error::Validation(_))), "{req:?}");
        }
    }

    #[test]
    fn normalize_resolves_dot_components() {
        assert_eq!(normalize(Path::new("/out/./a/../b.mp4")), Some(PathBuf::from("/out/b.mp4")));
        assert_eq!(normalize(Path::new("/out/../source.mkv")), Some(PathBuf::from("/source.mkv")));
        assert_eq!(normalize(Path::new("../out/x")), Some(PathBuf::from("../out/x")));
        assert_eq!(normalize(Path::new("./x")), Some(PathBuf::from("x")));
        assert_eq!(normalize(Path::new("/..")), None);
    }

    #[test]
    fn new_requires_all_tools() {
        let tools = ToolRegistry::empty()
            .with_tool(FFMPEG, "/bin/ffmpeg")
            .with_tool(FFPROBE, "/bin/ffprobe");
        let err = DashEncoder::new(&tools, EncodingConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Tool { ref tool, .. } if tool == MP4BOX));

        let tools = tools.with_tool(MP4BOX, "/bin/MP4Box");
        assert!(DashEncoder::new(&tools, EncodingConfig::default()).is_ok());
    }
}
