use std::{
    cell::RefCell,
    path::{Path, PathBuf},
    rc::Rc,
    sync::Arc,
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use particle_field_core::{
    attach, AppConfig, AudioHost, DecodedAudio, FixedRateScheduler, FrameScheduler, GridDims,
    NoiseKind, Raster, SpectrumAnalyser, SpectrumSnapshot, Style, UploadEvent, VisualizerError, VisualizerSession,
    FFT_SIZE,
};
use tracing_subscriber::EnvFilter;

/// Analysis frames fed before the reported one so smoothing has settled.
const WARMUP_FRAMES: usize = 16;

fn main() -> particle_field_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Spectrum { audio, at } => print_spectrum(&audio, at),
        Commands::Grid { ink_density } => print_grid(ink_density),
    }
}

fn run(args: RunArgs) -> particle_field_core::Result<()> {
    let mut config = match &args.preset {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    args.apply(&mut config);

    let surface = config.surface.clone();
    tracing::info!(
        width = surface.width,
        height = surface.height,
        fps = surface.fps,
        style = %config.visualizer.style,
        "starting particle field"
    );

    let start_playing = config.visualizer.is_audio_playing;
    let mut session = VisualizerSession::new(config.visualizer, audio_host());
    session.set_resume_on_upload(start_playing);
    if let Some(path) = &args.audio {
        session.upload_audio(std::fs::read(path)?)?;
    }
    if let Some(path) = &args.image {
        session.upload_image(&std::fs::read(path)?)?;
    }
    if let Some((x, y)) = args.pointer {
        session.pointer_moved(x, y);
    }

    let session = Rc::new(RefCell::new(session));
    let canvas = Rc::new(RefCell::new(Raster::new(surface.width, surface.height)));
    let mut scheduler = FixedRateScheduler::new(surface.fps);
    let frames_handle = attach(session.clone(), canvas.clone(), &mut scheduler);

    let report_every = u64::from(surface.fps.max(1));
    let reporter = {
        let session = session.clone();
        let canvas = canvas.clone();
        scheduler.on_frame(Box::new(move |tick| {
            let mut session = session.borrow_mut();
            for event in session.poll_uploads() {
                match event {
                    UploadEvent::AudioReady { seconds } => tracing::info!(seconds, "audio playing"),
                    UploadEvent::AudioFailed(err) => tracing::error!(%err, "audio upload failed"),
                }
            }
            if (tick.index + 1) % report_every != 0 {
                return;
            }
            if let Some(report) = session.last_report() {
                let spectrum = session.spectrum().summary();
                tracing::info!(
                    frame = tick.index + 1,
                    drawn = report.drawn,
                    skipped = ?report.skipped,
                    elapsed_time = report.elapsed_time,
                    mean_luma = canvas.borrow().mean_luma(),
                    peak_bin = spectrum.peak_bin,
                    mean_energy = spectrum.mean_energy,
                    "frame summary"
                );
            }
        }))
    };

    let produced = scheduler.run(args.frames);
    frames_handle.cancel();
    reporter.cancel();
    session.borrow_mut().teardown();
    tracing::info!(frames = produced, "particle field finished");
    Ok(())
}

fn print_spectrum(path: &Path, at: f32) -> particle_field_core::Result<()> {
    let track = particle_field_core::audio::decode(&std::fs::read(path)?)?;
    tracing::info!(?path, seconds = track.duration().as_secs_f32(), "analysing audio");

    let snapshot = spectrum_at(&track, at)?;
    let summary = snapshot.summary();
    let output = serde_json::json!({
        "at": at,
        "peakBin": summary.peak_bin,
        "peakEnergy": summary.peak_energy,
        "meanEnergy": summary.mean_energy,
        "bins": snapshot.bins(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Replays the display frames leading up to `at` through a fresh analyser.
fn spectrum_at(track: &DecodedAudio, at: f32) -> particle_field_core::Result<SpectrumSnapshot> {
    let position = Duration::try_from_secs_f32(at.max(0.0))
        .map_err(|err| VisualizerError::msg(format!("invalid playback position {at}: {err}")))?;
    let frames = track.frames();
    let hop = (track.sample_rate() as usize / 60).max(1);
    let end = track.position_at(position);

    let mut analyser = SpectrumAnalyser::new();
    let mut window = vec![0.0; FFT_SIZE];
    let mut snapshot = SpectrumSnapshot::silent();
    for step in (0..WARMUP_FRAMES).rev() {
        let back = (step * hop) % frames;
        track.fill_window((end + frames - back) % frames, &mut window);
        snapshot = analyser.analyse(&window);
    }
    Ok(snapshot)
}

fn print_grid(ink_density: f32) -> particle_field_core::Result<()> {
    let dims = GridDims::for_ink_density(ink_density);
    let output = serde_json::json!({
        "inkDensity": ink_density,
        "columns": dims.columns,
        "rows": dims.rows,
        "cells": dims.cell_count(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(feature = "device-output")]
fn audio_host() -> Arc<dyn AudioHost> {
    Arc::new(particle_field_core::CpalHost)
}

#[cfg(not(feature = "device-output"))]
fn audio_host() -> Arc<dyn AudioHost> {
    Arc::new(particle_field_core::HeadlessHost)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

fn parse_pointer(value: &str) -> Result<(f32, f32), String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got `{value}`"))?;
    let parse = |part: &str| part.trim().parse::<f32>().map_err(|err| err.to_string());
    Ok((parse(x)?, parse(y)?))
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive particle field", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render the particle field offscreen at a fixed frame rate.
    Run(RunArgs),
    /// Print the spectrum a track produces at a given playback position.
    Spectrum {
        /// Audio file to analyse.
        #[arg(short, long)]
        audio: PathBuf,
        /// Playback position in seconds.
        #[arg(long, default_value_t = 0.0)]
        at: f32,
    },
    /// Print the grid dimensions for an ink density.
    Grid {
        #[arg(long, default_value_t = 7.0)]
        ink_density: f32,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// JSON preset applied before the flags below.
    #[arg(short, long)]
    preset: Option<PathBuf>,
    /// Audio file to play and react to.
    #[arg(short, long)]
    audio: Option<PathBuf>,
    /// Image whose colors replace the style palette.
    #[arg(short, long)]
    image: Option<PathBuf>,
    /// One of color, ink, neon or glass.
    #[arg(long)]
    style: Option<Style>,
    #[arg(long)]
    noise: Option<NoiseKind>,
    #[arg(long)]
    particle_size: Option<f32>,
    #[arg(long)]
    exposure: Option<f32>,
    #[arg(long)]
    flow: Option<f32>,
    #[arg(long)]
    ink_density: Option<f32>,
    /// Keep audio paused, even once an upload finishes decoding.
    #[arg(long)]
    paused: bool,
    #[arg(long)]
    width: Option<usize>,
    #[arg(long)]
    height: Option<usize>,
    #[arg(long)]
    fps: Option<u32>,
    /// Stop after this many frames. Runs until interrupted otherwise.
    #[arg(long)]
    frames: Option<u64>,
    /// Fixed pointer position as X,Y.
    #[arg(long, value_parser = parse_pointer)]
    pointer: Option<(f32, f32)>,
}

impl RunArgs {
    fn apply(&self, config: &mut AppConfig) {
        let visualizer = &mut config.visualizer;
        if let Some(style) = self.style {
            visualizer.set_style(style);
        }
        if let Some(noise) = self.noise {
            visualizer.set_noise(noise);
        }
        if let Some(value) = self.particle_size {
            visualizer.set_particle_size(value);
        }
        if let Some(value) = self.exposure {
            visualizer.set_exposure(value);
        }
        if let Some(value) = self.flow {
            visualizer.set_flow(value);
        }
        if let Some(value) = self.ink_density {
            visualizer.set_ink_density(value);
        }
        if self.paused {
            visualizer.set_audio_playing(false);
        }

        let surface = &mut config.surface;
        surface.width = self.width.unwrap_or(surface.width);
        surface.height = self.height.unwrap_or(surface.height);
        surface.fps = self.fps.unwrap_or(surface.fps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone() -> DecodedAudio {
        let samples = (0..8_000)
            .map(|i| (i as f32 * 0.3).sin() * 0.5)
            .collect();
        DecodedAudio::from_mono(samples, 8_000).unwrap()
    }

    #[test]
    fn spectrum_rejects_unrepresentable_positions() {
        let track = tone();
        assert!(spectrum_at(&track, f32::INFINITY).is_err());
        assert!(spectrum_at(&track, 1e30).is_err());
    }

    #[test]
    fn spectrum_accepts_positions_past_the_loop() {
        let track = tone();
        assert!(!spectrum_at(&track, 0.25).unwrap().is_silent());
        assert!(!spectrum_at(&track, 12.5).unwrap().is_silent());
        assert!(!spectrum_at(&track, -3.0).unwrap().is_silent());
    }

    #[test]
    fn pointer_flag_parses_pairs() {
        assert_eq!(parse_pointer("10, 20.5"), Ok((10.0, 20.5)));
        assert!(parse_pointer("10").is_err());
        assert!(parse_pointer("a,b").is_err());
    }

    #[test]
    fn paused_flag_overrides_preset() {
        let cli = Cli::parse_from(["particle-field", "run", "--paused", "--ink-density", "3"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected the run subcommand");
        };
        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert!(!config.visualizer.is_audio_playing);
        assert_eq!(config.visualizer.ink_density, 3.0);
    }
}
