//! Work orders for the transcoder and the packager.
//!
//! Both builders are pure: they decide which files an external tool is
//! expected to produce and render the argument list, but never run anything.

use std::path::{Path, PathBuf};

use dashforge_core::{EncodeOptions, Quality, StreamFile, StreamType};

use crate::metadata::SourceMetadata;

/// Subtitle codecs ffmpeg can convert to WebVTT. Bitmap subtitles (PGS,
/// DVB, VobSub) are not text and are left out of the plan.
pub const TEXT_SUBTITLE_CODECS: &[&str] =
    &["subrip", "srt", "ass", "ssa", "webvtt", "mov_text", "text", "microdvd", "subviewer"];

/// Language label used when a subtitle stream carries none.
pub const UNDETERMINED_LANGUAGE: &str = "und";

/// Resolved frame rate and keyframe interval (in frames).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub framerate: u32,
    pub keyframe_interval: u32,
}

impl Timing {
    /// Keyframe spacing in milliseconds, used as the packager's segment and
    /// fragment duration.
    pub fn key_interval_ms(&self) -> u64 {
        let framerate = f64::from(self.framerate.max(1));
        (f64::from(self.keyframe_interval) / framerate * 1000.0).round() as u64
    }
}

/// Apply caller overrides: a zero framerate means the source's rounded
/// framerate, a zero keyframe interval means three times the framerate.
pub fn resolve_timing(framerate: u32, keyframe_interval: u32, source: &SourceMetadata) -> Timing {
    let framerate = if framerate == 0 {
        source.rounded_framerate()
    } else {
        framerate
    };
    let keyframe_interval = if keyframe_interval == 0 {
        framerate.saturating_mul(3)
    } else {
        keyframe_interval
    };
    Timing {
        framerate,
        keyframe_interval,
    }
}

/// Map a hardware acceleration method to `(hwaccel_args, encoder, software)`.
///
/// `hwaccel_args` go before `-i`; `software` is false for hardware encoders,
/// which do not take x264-style presets.
pub fn resolve_hw_accel(hw_accel: Option<&str>) -> (Vec<&'static str>, Option<&'static str>, bool) {
    match hw_accel {
        Some("videotoolbox") => (
            vec!["-hwaccel", "videotoolbox"],
            Some("h264_videotoolbox"),
            false,
        ),
        Some("nvenc") => (vec!["-hwaccel", "cuda"], Some("h264_nvenc"), false),
        Some("vaapi") => (
            vec!["-hwaccel", "vaapi", "-hwaccel_output_format", "vaapi"],
            Some("h264_vaapi"),
            false,
        ),
        Some("qsv") => (vec!["-hwaccel", "qsv"], Some("h264_qsv"), false),
        _ => (vec![], None, true),
    }
}

/// Inputs to [`TranscodePlan::build`].
#[derive(Debug, Clone, Copy)]
pub struct TranscodeParams<'a> {
    pub input: &'a Path,
    /// Directory the outputs are written to (the invocation workspace).
    pub work_dir: &'a Path,
    pub base_name: &'a str,
    /// Ladder, best first.
    pub ladder: &'a [Quality],
    pub source: &'a SourceMetadata,
    pub timing: Timing,
    pub options: &'a EncodeOptions,
    /// Copy the source streams for the copy-sentinel rung instead of re-encoding.
    pub stream_copy: bool,
}

/// Transcoder work order: every file ffmpeg will write plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodePlan {
    pub outputs: Vec<StreamFile>,
    pub args: Vec<String>,
}

impl TranscodePlan {
    /// Build a single ffmpeg invocation producing one video and one audio
    /// file per rung, plus one WebVTT file per text subtitle stream.
    pub fn build(params: &TranscodeParams<'_>) -> Self {
        let TranscodeParams {
            input,
            work_dir,
            base_name,
            ladder,
            source,
            timing,
            options,
            stream_copy,
        } = *params;

        let (hwaccel_args, hw_encoder, software) = resolve_hw_accel(options.hw_accel.as_deref());
        let encoder = hw_encoder.unwrap_or(options.video_codec.as_str());
        let vaapi = options.hw_accel.as_deref() == Some("vaapi");

        let mut outputs = Vec::new();
        let mut args: Vec<String> = ["-y", "-hide_banner", "-nostats", "-progress", "pipe:2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.extend(hwaccel_args.iter().map(|s| s.to_string()));
        args.push("-i".into());
        args.push(path_arg(input));

        for quality in ladder {
            let copy = stream_copy && quality.is_copy();

            if let Some(video) = source.primary_video {
                let path = work_dir.join(format!("{base_name}_{}.mp4", quality.bitrate));
                push(&mut args, ["-map", &format!("0:v:{video}")]);

                if copy {
                    push(&mut args, ["-c:v", "copy"]);
                } else {
                    push(&mut args, ["-c:v", encoder]);

                    let bitrate = if quality.is_copy() {
                        source.bitrate_kbps
                    } else {
                        u64::from(quality.bitrate)
                    };
                    if bitrate > 0 {
                        push(
                            &mut args,
                            [
                                "-b:v",
                                &format!("{bitrate}k"),
                                "-maxrate",
                                &format!("{bitrate}k"),
                                "-bufsize",
                                &format!("{}k", bitrate * 2),
                            ],
                        );
                    }
                    if software && !quality.preset.is_empty() {
                        push(&mut args, ["-preset", &quality.preset]);
                    }
                    if let Some(profile) = &quality.profile {
                        push(&mut args, ["-profile:v", profile]);
                    }
                    if let Some(level) = &quality.level {
                        push(&mut args, ["-level:v", level]);
                    }
                    if let Some(pix_fmt) = &quality.pixel_format {
                        push(&mut args, ["-pix_fmt", pix_fmt]);
                    }
                    if quality.has_resolution() && !quality.is_copy() {
                        let filter = if vaapi {
                            format!("scale_vaapi=w={}:h={}", quality.width, quality.height)
                        } else {
                            format!("scale={}:{}", quality.width, quality.height)
                        };
                        push(&mut args, ["-vf", &filter]);
                    }

                    let fr = timing.framerate.to_string();
                    let gop = timing.keyframe_interval.to_string();
                    push(
                        &mut args,
                        ["-r", &fr, "-g", &gop, "-keyint_min", &gop, "-sc_threshold", "0"],
                    );
                    args.extend(options.additional_video_flags.iter().cloned());
                }

                push(&mut args, ["-f", "mp4"]);
                args.push(path_arg(&path));
                outputs.push(StreamFile::new(path, StreamType::Video));
            }

            if let Some(audio) = source.primary_audio {
                let path = work_dir.join(format!("{base_name}_audio_{}.mp4", quality.bitrate));
                push(&mut args, ["-map", &format!("0:a:{audio}")]);

                if copy {
                    push(&mut args, ["-c:a", "copy"]);
                } else {
                    push(
                        &mut args,
                        [
                            "-c:a",
                            &options.audio_codec,
                            "-b:a",
                            &format!("{}k", options.audio_bitrate),
                        ],
                    );
                    if let Some(channels) = options.audio_channels {
                        push(&mut args, ["-ac", &channels.to_string()]);
                    }
                    args.extend(options.additional_audio_flags.iter().cloned());
                }

                push(&mut args, ["-f", "mp4"]);
                args.push(path_arg(&path));
                outputs.push(StreamFile::new(path, StreamType::Audio));
            }
        }

        for (position, stream) in source.subtitle_streams.iter().enumerate() {
            if !TEXT_SUBTITLE_CODECS.contains(&stream.codec_name.as_str()) {
                tracing::debug!(
                    "skipping subtitle stream {} ({}): not a text format",
                    stream.index,
                    stream.codec_name
                );
                continue;
            }
            let lang = stream
                .language
                .as_deref()
                .filter(|l| !l.trim().is_empty())
                .unwrap_or(UNDETERMINED_LANGUAGE);
            let path = work_dir.join(format!("{base_name}_subtitle_{lang}_{position}.vtt"));

            push(
                &mut args,
                ["-map", &format!("0:s:{position}"), "-c:s", "webvtt", "-f", "webvtt"],
            );
            args.push(path_arg(&path));
            outputs.push(StreamFile::new(path, StreamType::Subtitle).with_name(lang));
        }

        Self { outputs, args }
    }

    /// Split the outputs into packager inputs (audio and video) and subtitles.
    pub fn partition(&self) -> (Vec<StreamFile>, Vec<StreamFile>) {
        self.outputs
            .iter()
            .cloned()
            .partition(|f| f.stream_type != StreamType::Subtitle)
    }
}

/// Packager work order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePlan {
    pub inputs: Vec<StreamFile>,
    pub manifest_path: PathBuf,
    pub key_interval_ms: u64,
    pub args: Vec<String>,
}

impl PackagePlan {
    /// Build an MP4Box on-demand DASH invocation segmenting on keyframes.
    pub fn build(
        inputs: Vec<StreamFile>,
        manifest_path: PathBuf,
        timing: Timing,
        extra_flags: &[String],
    ) -> Self {
        let key_interval_ms = timing.key_interval_ms();
        let ms = key_interval_ms.to_string();

        let mut args: Vec<String> = Vec::new();
        push(
            &mut args,
            ["-dash", &ms, "-frag", &ms, "-rap", "-frag-rap", "-profile", "onDemand"],
        );
        args.extend(extra_flags.iter().cloned());
        args.push("-out".into());
        args.push(path_arg(&manifest_path));
        args.extend(inputs.iter().map(|f| path_arg(&f.path)));

        Self {
            inputs,
            manifest_path,
            key_interval_ms,
            args,
        }
    }
}

fn push<const N: usize>(args: &mut Vec<String>, items: [&str; N]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::StreamInfo;
    use std::collections::BTreeMap;

    fn info(index: u32, codec: &str, language: Option<&str>) -> StreamInfo {
        StreamInfo {
            index,
            codec_name: codec.to_string(),
            frame_rate: None,
            duration: None,
            width: None,
            height: None,
            language: language.map(str::to_string),
        }
    }

    fn source() -> SourceMetadata {
        SourceMetadata {
            video_streams: vec![info(0, "mjpeg", None), info(1, "h264", None)],
            audio_streams: vec![info(2, "aac", Some("eng"))],
            subtitle_streams: vec![
                info(3, "subrip", Some("en")),
                info(4, "hdmv_pgs_subtitle", Some("de")),
                info(5, "ass", None),
            ],
            tags: BTreeMap::new(),
            bitrate_kbps: 5000,
            duration: 60.0,
            framerate: 23.976,
            primary_video: Some(1),
            primary_audio: Some(0),
        }
    }

    fn params<'a>(
        source: &'a SourceMetadata,
        ladder: &'a [Quality],
        options: &'a EncodeOptions,
        stream_copy: bool,
    ) -> TranscodeParams<'a> {
        TranscodeParams {
            input: Path::new("/media/in.mkv"),
            work_dir: Path::new("/work"),
            base_name: "movie",
            ladder,
            source,
            timing: Timing {
                framerate: 24,
                keyframe_interval: 72,
            },
            options,
            stream_copy,
        }
    }

    fn contains_seq(args: &[String], seq: &[&str]) -> bool {
        args.windows(seq.len()).any(|w| w == seq)
    }

    #[test]
    fn timing_defaults() {
        let src = source();
        assert_eq!(
            resolve_timing(0, 0, &src),
            Timing {
                framerate: 24,
                keyframe_interval: 72
            }
        );
        assert_eq!(resolve_timing(30, 0, &src).keyframe_interval, 90);
        assert_eq!(resolve_timing(0, 48, &src).framerate, 24);
        assert_eq!(resolve_timing(25, 50, &src).keyframe_interval, 50);
    }

    #[test]
    fn key_interval_ms_rounds() {
        let t = Timing {
            framerate: 24,
            keyframe_interval: 72,
        };
        assert_eq!(t.key_interval_ms(), 3000);
        let t = Timing {
            framerate: 30,
            keyframe_interval: 25,
        };
        assert_eq!(t.key_interval_ms(), 833);
    }

    #[test]
    fn outputs_per_rung_and_subtitle() {
        let src = source();
        let ladder = vec![Quality::new(1280, 720, 3000), Quality::new(640, 360, 800)];
        let options = EncodeOptions::default();
        let plan = TranscodePlan::build(&params(&src, &ladder, &options, false));

        let names: Vec<String> = plan.outputs.iter().filter_map(|f| f.file_name()).collect();
        assert_eq!(
            names,
            vec![
                "movie_3000.mp4",
                "movie_audio_3000.mp4",
                "movie_800.mp4",
                "movie_audio_800.mp4",
                "movie_subtitle_en_0.vtt",
                "movie_subtitle_und_2.vtt",
            ]
        );
        assert!(plan.outputs.iter().all(|f| f.path.starts_with("/work")));
        assert_eq!(plan.outputs[4].name.as_deref(), Some("en"));
        assert_eq!(plan.outputs[5].name.as_deref(), Some("und"));
    }

    #[test]
    fn bitmap_subtitles_are_skipped() {
        let src = source();
        let ladder = vec![Quality::new(1280, 720, 3000)];
        let options = EncodeOptions::default();
        let plan = TranscodePlan::build(&params(&src, &ladder, &options, false));

        let subtitles: Vec<_> = plan
            .outputs
            .iter()
            .filter(|f| f.stream_type == StreamType::Subtitle)
            .collect();
        assert_eq!(subtitles.len(), 2);
        assert!(subtitles.iter().all(|f| f.name.as_deref() != Some("de")));
        assert!(!TEXT_SUBTITLE_CODECS.contains(&"hdmv_pgs_subtitle"));
        assert!(!contains_seq(&plan.args, &["-map", "0:s:1"]));
        assert!(contains_seq(&plan.args, &["-map", "0:s:0"]));
        assert!(contains_seq(&plan.args, &["-map", "0:s:2"]));
    }

    #[test]
    fn renders_encode_arguments() {
        let src = source();
        let ladder = vec![Quality::new(1280, 720, 3000).with_preset("slow")];
        let options = EncodeOptions::default();
        let plan = TranscodePlan::build(&params(&src, &ladder, &options, false));
        let args = &plan.args;

        assert!(contains_seq(args, &["-progress", "pipe:2"]));
        assert!(contains_seq(args, &["-i", "/media/in.mkv"]));
        assert!(contains_seq(args, &["-map", "0:v:1", "-c:v", "libx264"]));
        assert!(contains_seq(args, &["-b:v", "3000k", "-maxrate", "3000k", "-bufsize", "6000k"]));
        assert!(contains_seq(args, &["-preset", "slow"]));
        assert!(contains_seq(args, &["-vf", "scale=1280:720"]));
        assert!(contains_seq(args, &["-r", "24", "-g", "72", "-keyint_min", "72"]));
        assert!(contains_seq(args, &["-map", "0:a:0", "-c:a", "aac", "-b:a", "128k", "-ac", "2"]));
        assert!(contains_seq(args, &["-map", "0:s:0", "-c:s", "webvtt", "-f", "webvtt", "/work/movie_subtitle_en_0.vtt"]));
        assert!(!args.iter().any(|a| a == "0:s:1"));
        assert_eq!(args.last().unwrap(), "/work/movie_subtitle_und_2.vtt");
    }

    #[test]
    fn copy_sentinel_with_stream_copy() {
        let src = source();
        let ladder = vec![Quality::copy(), Quality::new(0, 0, 800)];
        let options = EncodeOptions::default();
        let plan = TranscodePlan::build(&params(&src, &ladder, &options, true));

        assert!(contains_seq(&plan.args, &["-map", "0:v:1", "-c:v", "copy", "-f", "mp4", "/work/movie_0.mp4"]));
        assert!(contains_seq(&plan.args, &["-map", "0:a:0", "-c:a", "copy", "-f", "mp4"]));
        assert!(contains_seq(&plan.args, &["-b:v", "800k"]));
    }

    #[test]
    fn copy_sentinel_without_stream_copy_reencodes_at_source_bitrate() {
        let src = source();
        let ladder = vec![Quality::copy()];
        let options = EncodeOptions::default();
        let plan = TranscodePlan::build(&params(&src, &ladder, &options, false));

        assert!(!contains_seq(&plan.args, &["-c:v", "copy"]));
        assert!(contains_seq(&plan.args, &["-b:v", "5000k"]));
        assert!(!plan.args.iter().any(|a| a == "-vf"));
    }

    #[test]
    fn hardware_encoder_replaces_codec_and_preset() {
        let src = source();
        let ladder = vec![Quality::new(1280, 720, 3000)];
        let options = EncodeOptions {
            hw_accel: Some("vaapi".into()),
            ..EncodeOptions::default()
        };
        let plan = TranscodePlan::build(&params(&src, &ladder, &options, false));

        assert!(contains_seq(&plan.args, &["-hwaccel", "vaapi", "-hwaccel_output_format", "vaapi", "-i"]));
        assert!(contains_seq(&plan.args, &["-c:v", "h264_vaapi"]));
        assert!(contains_seq(&plan.args, &["-vf", "scale_vaapi=w=1280:h=720"]));
        assert!(!plan.args.iter().any(|a| a == "-preset"));
    }

    #[test]
    fn resolve_hw_accel_methods() {
        assert_eq!(resolve_hw_accel(None), (vec![], None, true));
        assert_eq!(resolve_hw_accel(Some("none")), (vec![], None, true));
        assert_eq!(
            resolve_hw_accel(Some("nvenc")),
            (vec!["-hwaccel", "cuda"], Some("h264_nvenc"), false)
        );
        assert_eq!(resolve_hw_accel(Some("qsv")).1, Some("h264_qsv"));
        assert_eq!(resolve_hw_accel(Some("videotoolbox")).1, Some("h264_videotoolbox"));
    }

    #[test]
    fn audio_only_source() {
        let mut src = source();
        src.primary_video = None;
        src.subtitle_streams.clear();
        let ladder = vec![Quality::new(0, 0, 800)];
        let options = EncodeOptions::default();
        let plan = TranscodePlan::build(&params(&src, &ladder, &options, false));
        assert_eq!(plan.outputs.len(), 1);
        assert_eq!(plan.outputs[0].stream_type, StreamType::Audio);
        assert!(!plan.args.iter().any(|a| a == "-c:v"));
    }

    #[test]
    fn partition_separates_subtitles() {
        let src = source();
        let ladder = vec![Quality::new(0, 0, 800)];
        let options = EncodeOptions::default();
        let plan = TranscodePlan::build(&params(&src, &ladder, &options, false));
        let (media, subs) = plan.partition();
        assert_eq!(media.len(), 2);
        assert_eq!(subs.len(), 2);
        assert!(subs.iter().all(|s| s.stream_type == StreamType::Subtitle));
    }

    #[test]
    fn package_plan_arguments() {
        let inputs = vec![
            StreamFile::new("/work/movie_3000.mp4", StreamType::Video),
            StreamFile::new("/work/movie_audio_3000.mp4", StreamType::Audio),
        ];
        let plan = PackagePlan::build(
            inputs,
            PathBuf::from("/out/movie.mpd"),
            Timing {
                framerate: 24,
                keyframe_interval: 48,
            },
            &["-bs-switching".to_string(), "no".to_string()],
        );
        assert_eq!(plan.key_interval_ms, 2000);
        assert_eq!(
            plan.args,
            vec![
                "-dash", "2000", "-frag", "2000", "-rap", "-frag-rap", "-profile", "onDemand",
                "-bs-switching", "no", "-out", "/out/movie.mpd", "/work/movie_3000.mp4",
                "/work/movie_audio_3000.mp4",
            ]
        );
    }
}
