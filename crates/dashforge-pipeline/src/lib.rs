//! # dashforge-pipeline
//!
//! Orchestrates ffmpeg and MP4Box to turn one media file into an MPEG-DASH
//! package.
//!
//! - [`metadata`] -- interpret probe output into [`SourceMetadata`].
//! - [`ladder`] -- validate and crush the requested quality ladder.
//! - [`plan`] -- build transcoder and packager work orders.
//! - [`progress`] -- turn transcoder output into completion fractions.
//! - [`sink`] -- progress and diagnostic sinks.
//! - [`postprocess`] -- strip and extend the generated manifest.
//! - [`encoder`] -- [`DashEncoder::generate_dash`], sequencing all of the above.

pub mod encoder;
pub mod ladder;
pub mod metadata;
pub mod plan;
pub mod postprocess;
pub mod progress;
pub mod sink;

pub use encoder::{DashEncodeResult, DashEncoder, DashRequest, Stage};
pub use metadata::{SourceMetadata, StreamInfo};
pub use plan::{PackagePlan, Timing, TranscodePlan};
pub use progress::ProgressTracker;
pub use sink::{ChannelProgress, DiagnosticSink, ProgressFn, ProgressSink, TracingDiagnostics};
