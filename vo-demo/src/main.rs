//! VA video output demo
//!
//! Configures a `VideoOutput` for a synthetic stream, runs the
//! acquire/publish/flip loop a decoder would run, and prints the session
//! statistics as JSON. Uses the in-process simulated service by default;
//! `--backend vaapi` drives a real libva display instead.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vo_common::{VideoFormat, WindowId};
use vo_output::{
    AccelService, DisplayEvent, MappingPolicy, OutputOptions, SimulatedService, VideoOutput,
    WindowGeometry,
};
use vo_vaapi::{VaLibrary, VaapiService};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    Simulated,
    Vaapi,
}

/// Play a synthetic stream through the VA video output
#[derive(Parser, Debug)]
#[command(name = "vo-demo")]
#[command(about = "Exercise the VA surface pool and output ring")]
#[command(version)]
struct Args {
    /// Stream format (mpeg2, mpeg4, h263, h264, wmv3, vc1)
    #[arg(short, long, default_value = "h264")]
    codec: VideoFormat,

    /// Stream width in pixels
    #[arg(long, default_value = "1920")]
    width: u32,

    /// Stream height in pixels
    #[arg(long, default_value = "1080")]
    height: u32,

    /// Number of frames to push through the pipeline
    #[arg(short, long, default_value = "120")]
    frames: u64,

    /// Surface mapping: 0|indirect, 1|direct, 2|auto (overrides the options file)
    #[arg(long)]
    policy: Option<MappingPolicy>,

    /// Surface ceiling for indirect mapping (overrides the options file)
    #[arg(long)]
    max_surfaces: Option<usize>,

    /// Present through the accelerated rendering path
    #[arg(long)]
    accelerated: bool,

    /// With --accelerated, bind surfaces as textures instead of copying
    #[arg(long)]
    bind_texture: bool,

    /// JSON file with output options
    #[arg(long)]
    options: Option<PathBuf>,

    /// Acceleration backend
    #[arg(long, value_enum, default_value = "simulated")]
    backend: Backend,

    /// Simulated backend: report that presented surfaces stay in use
    #[arg(long)]
    retains_surfaces: bool,

    /// X display for the vaapi backend (defaults to $DISPLAY)
    #[arg(long)]
    display: Option<String>,

    /// Target window id
    #[arg(long, default_value = "0")]
    window: u64,

    /// Pause and repaint every N frames (0 = never)
    #[arg(long, default_value = "0")]
    pause_every: u64,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_options(args: &Args) -> anyhow::Result<OutputOptions> {
    let mut options = match &args.options {
        Some(path) => OutputOptions::from_path(path)
            .with_context(|| format!("Failed to load options from {}", path.display()))?,
        None => OutputOptions::default(),
    };

    if let Some(policy) = args.policy {
        options.mapping = policy;
    }
    if let Some(max) = args.max_surfaces {
        options.max_surfaces = max;
    }
    options.accelerated |= args.accelerated;
    options.bind_texture |= args.bind_texture;
    Ok(options)
}

fn play<S: AccelService>(output: &mut VideoOutput<S>, args: &Args) -> anyhow::Result<()> {
    let config = output
        .configure(args.width, args.height, args.codec)
        .with_context(|| format!("Cannot configure {} {}x{}", args.codec, args.width, args.height))?;

    let mut retired = None;
    for frame in 0..args.frames {
        let identity = (frame as usize) % config.surface_count;
        let surface = output
            .acquire_surface(identity, retired.take())
            .with_context(|| format!("Acquire failed at frame {frame}"))?;
        retired = output
            .publish_surface(surface)
            .with_context(|| format!("Publish failed at frame {frame}"))?;

        if !output.flip_page() {
            warn!(frame, "Frame dropped");
        }

        if args.pause_every > 0 && frame % args.pause_every == args.pause_every - 1 {
            output.pause();
            output.on_display_event(DisplayEvent::Expose);
            output.resume();
        }
    }

    info!(
        frames = args.frames,
        surfaces = config.surface_count,
        mapping = %config.mapping,
        "Playback finished"
    );
    println!("{}", serde_json::to_string_pretty(&output.stats())?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let options = load_options(&args)?;
    let window = WindowGeometry::new(WindowId(args.window), args.width, args.height);

    match args.backend {
        Backend::Simulated => {
            let service = SimulatedService::new().with_retention(Some(args.retains_surfaces));
            let mut output = VideoOutput::new(service, window, options)?;
            play(&mut output, &args)
        }
        Backend::Vaapi => {
            let lib = VaLibrary::load().context("libva is not available")?;
            let service = VaapiService::open(lib, args.display.as_deref())?;
            let mut output = VideoOutput::new(service, window, options)?;
            play(&mut output, &args)
        }
    }
}
