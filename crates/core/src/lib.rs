//! Core library for the audio-reactive particle field.
//!
//! A fixed grid of particles is redrawn every display frame. Each cell is
//! displaced by an animated noise field, by the energy of one spectrum bin of
//! the uploaded audio and by the pointer, then painted in one of four visual
//! styles or in colors sampled from an uploaded image. Each module owns one
//! stage of that pipeline; [`VisualizerSession`] wires them together for a
//! host UI.

pub mod analysis;
pub mod assets;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod pointer;
pub mod render;
pub mod scene;
pub mod session;
pub mod timeline;

pub use analysis::{SpectrumAnalyser, SpectrumSnapshot, SpectrumSummary, FFT_SIZE, SPECTRUM_BINS};
pub use assets::{ColorFieldSampler, ColorGrid};
#[cfg(feature = "device-output")]
pub use audio::CpalHost;
pub use audio::{AudioContext, AudioHost, AudioSpectrumSource, DecodeTask, DecodedAudio, HeadlessHost};
pub use config::{AppConfig, GridDims, SurfaceConfig, VisualizerConfig, GRID_ROWS, MAX_COLUMNS};
pub use engine::{EngineState, FrameInputs, FrameReport, ParticleFieldEngine, SkipReason};
pub use error::{Result, VisualizerError};
pub use mapping::NoiseKind;
pub use pointer::{PointerState, PointerTracker};
pub use render::{BlendMode, Canvas, DrawCommand, DrawList, Raster};
pub use scene::{Rgb, Style};
pub use session::{attach, UploadEvent, VisualizerSession};
pub use timeline::{
    CancellationHandle, FixedRateScheduler, FrameScheduler, FrameTick, ManualScheduler, PlaybackClock,
};
