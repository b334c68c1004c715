use clap::{Args, Parser, Subcommand};
use dashforge_core::Quality;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dashforge")]
#[command(author, version, about = "Multi-bitrate MPEG-DASH packaging tool")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encode a media file into a DASH package
    Encode(EncodeArgs),

    /// Probe a media file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default search if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Args)]
pub struct EncodeArgs {
    /// Input media file
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output directory for the manifest and segments (created if missing)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Base name of produced files (defaults to the input file stem)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Quality rung as WIDTHxHEIGHT@BITRATE[:PRESET], BITRATE, or "copy".
    /// Repeat for each rung; defaults to the configured ladder.
    #[arg(short, long = "quality", value_name = "QUALITY")]
    pub qualities: Vec<Quality>,

    /// Output frame rate (0 keeps the source rate)
    #[arg(long, default_value_t = 0)]
    pub framerate: u32,

    /// Frames between keyframes (0 means three times the frame rate)
    #[arg(long, default_value_t = 0)]
    pub keyframe_interval: u32,

    /// Encode every rung even when it exceeds the source bitrate
    #[arg(long)]
    pub no_crush: bool,

    /// Copy source streams for the "copy" rung instead of re-encoding
    #[arg(long)]
    pub stream_copy: bool,

    /// Hardware acceleration (videotoolbox, nvenc, vaapi, qsv)
    #[arg(long)]
    pub hw_accel: Option<String>,
}
