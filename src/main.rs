mod cli;

use dashforge::config;
use dashforge_av::tools::FFPROBE;
use dashforge_av::{FfprobeProber, Prober, TokioProcessRunner, ToolRegistry};
use dashforge_core::{EncodeOptions, Error};
use dashforge_pipeline::{ChannelProgress, DashEncoder, DashRequest, SourceMetadata};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, EncodeArgs};
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            // Verbose mode also shows raw ffmpeg / MP4Box output (dashforge::tool)
            "dashforge=trace,dashforge_pipeline=debug,dashforge_av=debug,dashforge_mpd=debug"
                .to_string()
        } else {
            "dashforge=info,dashforge_pipeline=info,dashforge_av=warn,dashforge_mpd=warn"
                .to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Encode(args) => encode(args, cli.config.as_deref()),
        Commands::Probe { file, json } => probe_file(&file, json, cli.config.as_deref()),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("dashforge {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let code = e.downcast_ref::<Error>().map_or(1, Error::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn encode(args: EncodeArgs, config_path: Option<&Path>) -> Result<ExitCode> {
    let mut config = config::load_config_or_default(config_path)?;
    if args.no_crush {
        config.encoding.disable_quality_crushing = true;
    }
    if args.stream_copy {
        config.encoding.enable_stream_copying = true;
    }

    let qualities = if args.qualities.is_empty() {
        config.encoding.ladder.clone()
    } else {
        args.qualities
    };

    let base_name = match args.name {
        Some(name) => name,
        None => args
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .context("Cannot derive an output name from the input; pass --name")?,
    };

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory: {:?}", args.output))?;

    let tools = ToolRegistry::discover(&config.tools);
    let encoder = DashEncoder::new(&tools, config.encoding)?;

    let request = DashRequest::new(&args.input, &args.output, base_name, qualities)
        .with_timing(args.framerate, args.keyframe_interval)
        .with_options(EncodeOptions {
            hw_accel: args.hw_accel,
            ..EncodeOptions::default()
        });

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let (progress, mut rx) = ChannelProgress::channel();
        let renderer = tokio::spawn(async move {
            let mut shown = None;
            while let Some(fraction) = rx.recv().await {
                let percent = (fraction * 100.0).floor() as u32;
                if shown != Some(percent) {
                    shown = Some(percent);
                    eprint!("\rTranscoding: {percent:>3}%");
                    let _ = std::io::stderr().flush();
                }
            }
            if shown.is_some() {
                eprintln!();
            }
        });

        let result = encoder.generate_dash(&request, &progress).await;
        drop(progress);
        let _ = renderer.await;
        result
    })?;

    match result {
        Some(result) => {
            println!("Manifest: {}", result.manifest_path.display());
            println!("Duration: {}", format_duration(result.duration));
            println!(
                "Representations: {}",
                result.manifest.representation_ids().len()
            );
            if let Some(title) = result.source_tags.get("title") {
                println!("Title: {}", title);
            }
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("Packaging failed for {:?}; see log output for details", args.input);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<ExitCode> {
    if !file.exists() {
        return Err(Error::Validation(format!("File does not exist: {:?}", file)).into());
    }

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools);
    let runner = Arc::new(TokioProcessRunner::new().with_timeout(tools.timeout()));
    let prober = FfprobeProber::new(tools.path(FFPROBE)?.to_path_buf(), runner);

    let rt = tokio::runtime::Runtime::new()?;
    let doc = rt.block_on(prober.probe(file))?;
    let meta = SourceMetadata::from_probe(&doc)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meta)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("File: {}", file.display());
    println!("Duration: {}", format_duration(meta.duration));
    println!("Bitrate: {} kb/s", meta.bitrate_kbps);
    println!("Frame rate: {:.3} fps", meta.framerate);

    println!("\nVideo Streams: {}", meta.video_streams.len());
    for (i, stream) in meta.video_streams.iter().enumerate() {
        print!("  [{}] #{} {}", i, stream.index, stream.codec_name);
        if let (Some(w), Some(h)) = (stream.width, stream.height) {
            print!(" {}x{}", w, h);
        }
        if meta.primary_video == Some(i) {
            print!(" [primary]");
        }
        println!();
    }

    println!("\nAudio Streams: {}", meta.audio_streams.len());
    for (i, stream) in meta.audio_streams.iter().enumerate() {
        print!("  [{}] #{} {}", i, stream.index, stream.codec_name);
        if let Some(ref lang) = stream.language {
            print!(" ({})", lang);
        }
        if meta.primary_audio == Some(i) {
            print!(" [primary]");
        }
        println!();
    }

    println!("\nSubtitle Streams: {}", meta.subtitle_streams.len());
    for (i, stream) in meta.subtitle_streams.iter().enumerate() {
        print!("  [{}] #{} {}", i, stream.index, stream.codec_name);
        if let Some(ref lang) = stream.language {
            print!(" ({})", lang);
        }
        println!();
    }

    if !meta.tags.is_empty() {
        println!("\nTags:");
        for (key, value) in &meta.tags {
            println!("  {}: {}", key, value);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn check_tools(config_path: Option<&Path>) -> Result<ExitCode> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. ffmpeg, ffprobe, and MP4Box are all required to encode.");
    }

    Ok(ExitCode::SUCCESS)
}

fn validate_config(path: Option<&Path>) -> Result<ExitCode> {
    let (config, source) = match path {
        Some(p) => (config::Config::load(p)?, Some(p.to_path_buf())),
        None => match config::find_config() {
            Some(found) => (config::Config::load(&found)?, Some(found)),
            None => (config::Config::default(), None),
        },
    };

    match source {
        Some(p) => println!("Validating config: {:?}", p),
        None => println!("No config file found, using defaults"),
    }

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("Configuration loaded with {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  ! {}", warning);
        }
    }

    let encoding = &config.encoding;
    println!(
        "  Working directory: {}",
        encoding.working_directory().display()
    );
    println!("  Quality crushing: {}", !encoding.disable_quality_crushing);
    println!("  Crush tolerance: {}", encoding.crush_tolerance);
    println!("  Stream copying: {}", encoding.enable_stream_copying);
    println!(
        "  Hardware acceleration: {}",
        encoding.hw_accel.as_deref().unwrap_or("none")
    );
    println!("  Default ladder: {} rung(s)", encoding.ladder.len());
    for quality in &encoding.ladder {
        println!("    {}", quality);
    }

    Ok(ExitCode::SUCCESS)
}

fn format_duration(seconds: f64) -> String {
    let secs = seconds.max(0.0).round() as u64;
    let mins = secs / 60;
    let hours = mins / 60;
    format!("{:02}:{:02}:{:02}", hours, mins % 60, secs % 60)
}
