//! Source metadata interpretation.
//!
//! Turns a raw [`ProbeDocument`] into a normalized [`SourceMetadata`]: streams
//! bucketed by type, the primary video and audio streams selected, tags
//! case-folded, and the frame rate resolved.

use std::collections::BTreeMap;

use dashforge_av::{ProbeDocument, ProbeStream};
use dashforge_core::{Error, Result};
use serde::Serialize;

/// Frame rate assumed when the source does not declare a usable one.
pub const DEFAULT_FRAMERATE: f64 = 24.0;

/// Video codecs the transcoder can decode for a primary stream. Image codecs
/// (cover art) are deliberately absent.
pub const SUPPORTED_VIDEO_CODECS: &[&str] = &[
    "h264",
    "hevc",
    "av1",
    "vp8",
    "vp9",
    "mpeg1video",
    "mpeg2video",
    "mpeg4",
    "vc1",
    "theora",
    "prores",
    "dnxhd",
    "h263",
    "wmv3",
    "msmpeg4v3",
];

/// Audio codecs accepted for the primary audio stream.
pub const SUPPORTED_AUDIO_CODECS: &[&str] = &[
    "aac", "mp3", "mp2", "ac3", "eac3", "dts", "truehd", "opus", "vorbis", "flac", "alac",
    "wmav2", "pcm_s16le", "pcm_s24le",
];

/// One elementary stream of the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamInfo {
    /// Absolute stream index in the container.
    pub index: u32,
    pub codec_name: String,
    /// Raw frame-rate string (`r_frame_rate`, else `avg_frame_rate`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<String>,
    /// Seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl StreamInfo {
    fn from_probe(stream: &ProbeStream) -> Self {
        Self {
            index: stream.index,
            codec_name: stream.codec_name.clone().unwrap_or_default(),
            frame_rate: stream
                .r_frame_rate
                .clone()
                .or_else(|| stream.avg_frame_rate.clone()),
            duration: stream.duration.as_deref().and_then(|d| d.trim().parse().ok()),
            width: stream.width,
            height: stream.height,
            language: stream.tag("language").map(str::to_string),
        }
    }
}

/// Normalized description of the input file. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceMetadata {
    pub video_streams: Vec<StreamInfo>,
    pub audio_streams: Vec<StreamInfo>,
    pub subtitle_streams: Vec<StreamInfo>,
    /// Container tags with lower-cased keys; the first occurrence of a key wins.
    pub tags: BTreeMap<String, String>,
    /// Overall bitrate in kb/s (0 when unknown).
    pub bitrate_kbps: u64,
    /// Overall duration in seconds (0 when unknown).
    pub duration: f64,
    /// Frame rate of the primary video stream, or [`DEFAULT_FRAMERATE`].
    pub framerate: f64,
    /// Position of the primary video stream within `video_streams`.
    pub primary_video: Option<usize>,
    /// Position of the primary audio stream within `audio_streams`.
    pub primary_audio: Option<usize>,
}

impl SourceMetadata {
    /// Interpret a probe document.
    ///
    /// Fails with [`Error::Probe`] when the source has neither a supported
    /// video stream nor a supported audio stream.
    pub fn from_probe(doc: &ProbeDocument) -> Result<Self> {
        let mut video_streams = Vec::new();
        let mut audio_streams = Vec::new();
        let mut subtitle_streams = Vec::new();

        for stream in &doc.streams {
            let bucket = match stream.codec_type.as_deref() {
                Some("video") => &mut video_streams,
                Some("audio") => &mut audio_streams,
                Some("subtitle") => &mut subtitle_streams,
                _ => continue,
            };
            bucket.push(StreamInfo::from_probe(stream));
        }

        let primary_video = first_supported(&video_streams, SUPPORTED_VIDEO_CODECS);
        let primary_audio = first_supported(&audio_streams, SUPPORTED_AUDIO_CODECS);

        if primary_video.is_none() && primary_audio.is_none() {
            return Err(Error::Probe(
                "source has no supported video or audio stream".to_string(),
            ));
        }

        let framerate = primary_video
            .and_then(|i| video_streams[i].frame_rate.as_deref())
            .and_then(parse_frame_rate)
            .unwrap_or(DEFAULT_FRAMERATE);

        let mut tags = BTreeMap::new();
        for (key, value) in &doc.format.tags {
            tags.entry(key.to_lowercase())
                .or_insert_with(|| value.clone());
        }

        let bitrate_kbps = doc
            .format
            .bit_rate
            .as_deref()
            .and_then(|b| b.trim().parse::<u64>().ok())
            .map(|bps| bps / 1000)
            .unwrap_or(0);

        let duration = doc
            .format
            .duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
            .unwrap_or(0.0);

        Ok(Self {
            video_streams,
            audio_streams,
            subtitle_streams,
            tags,
            bitrate_kbps,
            duration,
            framerate,
            primary_video,
            primary_audio,
        })
    }

    /// The selected video stream.
    pub fn primary_video_stream(&self) -> Option<&StreamInfo> {
        self.primary_video.map(|i| &self.video_streams[i])
    }

    /// The selected audio stream.
    pub fn primary_audio_stream(&self) -> Option<&StreamInfo> {
        self.primary_audio.map(|i| &self.audio_streams[i])
    }

    /// Frame rate rounded to a whole number, never below 1.
    pub fn rounded_framerate(&self) -> u32 {
        (self.framerate.round() as u32).max(1)
    }
}

fn first_supported(streams: &[StreamInfo], supported: &[&str]) -> Option<usize> {
    streams
        .iter()
        .position(|s| supported.contains(&s.codec_name.as_str()))
}

/// Parse `num/den` or a plain decimal. Zero, negative, and non-finite rates
/// are rejected.
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let rate = rate.trim();
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: u32, codec_type: &str, codec_name: &str) -> ProbeStream {
        ProbeStream {
            index,
            codec_type: Some(codec_type.to_string()),
            codec_name: Some(codec_name.to_string()),
            ..ProbeStream::default()
        }
    }

    fn document(streams: Vec<ProbeStream>) -> ProbeDocument {
        let mut doc = ProbeDocument {
            streams,
            ..ProbeDocument::default()
        };
        doc.format.duration = Some("120.5".into());
        doc.format.bit_rate = Some("5000999".into());
        doc
    }

    #[test]
    fn frame_rate_forms() {
        assert!((parse_frame_rate("24000/1001").unwrap() - 23.976).abs() < 0.001);
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("29.97"), Some(29.97));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("invalid"), None);
        assert_eq!(parse_frame_rate("-25"), None);
    }

    #[test]
    fn buckets_streams_and_ignores_unknown_types() {
        let doc = document(vec![
            stream(0, "video", "h264"),
            stream(1, "audio", "aac"),
            stream(2, "subtitle", "subrip"),
            stream(3, "data", "bin_data"),
            stream(4, "attachment", "ttf"),
        ]);
        let meta = SourceMetadata::from_probe(&doc).unwrap();
        assert_eq!(meta.video_streams.len(), 1);
        assert_eq!(meta.audio_streams.len(), 1);
        assert_eq!(meta.subtitle_streams.len(), 1);
        assert_eq!(meta.bitrate_kbps, 5000);
        assert_eq!(meta.duration, 120.5);
    }

    #[test]
    fn primary_stream_skips_unsupported_codecs() {
        let mut cover = stream(0, "video", "mjpeg");
        cover.r_frame_rate = Some("90000/1".into());
        let mut main = stream(1, "video", "hevc");
        main.r_frame_rate = Some("30000/1001".into());
        let doc = document(vec![
            cover,
            main,
            stream(2, "audio", "cook"),
            stream(3, "audio", "eac3"),
        ]);

        let meta = SourceMetadata::from_probe(&doc).unwrap();
        assert_eq!(meta.primary_video, Some(1));
        assert_eq!(meta.primary_audio, Some(1));
        assert_eq!(meta.primary_video_stream().unwrap().codec_name, "hevc");
        assert_eq!(meta.video_streams.len(), 2);
        assert!((meta.framerate - 29.97).abs() < 0.01);
        assert_eq!(meta.rounded_framerate(), 30);
    }

    #[test]
    fn unparseable_framerate_defaults_to_24() {
        let mut video = stream(0, "video", "h264");
        video.r_frame_rate = Some("0/0".into());
        let meta = SourceMetadata::from_probe(&document(vec![video])).unwrap();
        assert_eq!(meta.framerate, DEFAULT_FRAMERATE);

        let audio_only = SourceMetadata::from_probe(&document(vec![stream(0, "audio", "mp3")]))
            .unwrap();
        assert_eq!(audio_only.framerate, DEFAULT_FRAMERATE);
        assert!(audio_only.primary_video_stream().is_none());
    }

    #[test]
    fn avg_frame_rate_is_fallback() {
        let mut video = stream(0, "video", "vp9");
        video.avg_frame_rate = Some("25/1".into());
        let meta = SourceMetadata::from_probe(&document(vec![video])).unwrap();
        assert_eq!(meta.framerate, 25.0);
    }

    #[test]
    fn tags_fold_case_first_wins() {
        let mut doc = document(vec![stream(0, "audio", "aac")]);
        doc.format.tags = vec![
            ("Title".into(), "First".into()),
            ("TITLE".into(), "Second".into()),
            ("encoder".into(), "Lavf60".into()),
        ];
        let meta = SourceMetadata::from_probe(&doc).unwrap();
        assert_eq!(meta.tags.len(), 2);
        assert_eq!(meta.tags["title"], "First");
        assert_eq!(meta.tags["encoder"], "Lavf60");
    }

    #[test]
    fn missing_format_fields_default_to_zero() {
        let doc = ProbeDocument {
            streams: vec![stream(0, "video", "av1")],
            ..ProbeDocument::default()
        };
        let meta = SourceMetadata::from_probe(&doc).unwrap();
        assert_eq!(meta.duration, 0.0);
        assert_eq!(meta.bitrate_kbps, 0);
    }

    #[test]
    fn nothing_usable_is_probe_error() {
        let doc = document(vec![stream(0, "video", "png"), stream(1, "subtitle", "ass")]);
        let err = SourceMetadata::from_probe(&doc).unwrap_err();
        assert!(matches!(err, Error::Probe(_)));
    }

    #[test]
    fn stream_language_from_tags() {
        let mut sub = stream(2, "subtitle", "subrip");
        sub.tags = vec![("LANGUAGE".into(), "fre".into())];
        let doc = document(vec![stream(0, "audio", "aac"), sub]);
        let meta = SourceMetadata::from_probe(&doc).unwrap();
        assert_eq!(meta.subtitle_streams[0].language.as_deref(), Some("fre"));
    }
}
