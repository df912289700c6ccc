use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{NoiseKind, Result, Style};

/// Number of rows in the particle grid. Independent of every setting.
pub const GRID_ROWS: usize = 40;

/// Column count at an ink density of 5.
const BASE_COLUMNS: f32 = 60.0;

/// Upper bound on the column count, reached at an ink density of 400.
pub const MAX_COLUMNS: usize = 4_800;

/// Visual parameters read by the engine once per frame.
///
/// The struct is owned by whichever layer drives the UI; the engine only ever
/// sees a shared reference. Out-of-range values are accepted as-is and are
/// tamed by the `max`/`clamp` guards inside the per-cell math.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VisualizerConfig {
    /// Baseline cell scale.
    pub particle_size: f32,
    /// Opacity intensity, nominally 0..=100.
    pub exposure: f32,
    /// Noise speed and audio displacement gain.
    pub flow: f32,
    /// Controls the column count, nominally 1..=10.
    pub ink_density: f32,
    pub is_audio_playing: bool,
    pub style: Style,
    pub noise: NoiseKind,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            particle_size: 40.0,
            exposure: 75.0,
            flow: 65.0,
            ink_density: 7.0,
            is_audio_playing: true,
            style: Style::Color,
            noise: NoiseKind::Wave,
        }
    }
}

impl VisualizerConfig {
    /// Parses a JSON preset. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Loads a JSON preset from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn set_particle_size(&mut self, value: f32) {
        self.particle_size = value;
    }

    pub fn set_exposure(&mut self, value: f32) {
        self.exposure = value;
    }

    pub fn set_flow(&mut self, value: f32) {
        self.flow = value;
    }

    pub fn set_ink_density(&mut self, value: f32) {
        self.ink_density = value;
    }

    pub fn set_audio_playing(&mut self, playing: bool) {
        self.is_audio_playing = playing;
    }

    pub fn set_style(&mut self, style: Style) {
        self.style = style;
    }

    pub fn set_noise(&mut self, noise: NoiseKind) {
        self.noise = noise;
    }

    /// Grid resolution implied by the current ink density.
    pub fn grid_dims(&self) -> GridDims {
        GridDims::for_ink_density(self.ink_density)
    }
}

/// Resolution of the particle grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridDims {
    pub columns: usize,
    pub rows: usize,
}

impl GridDims {
    /// `columns = max(1, floor(60 * ink_density / 5))`, capped at
    /// [`MAX_COLUMNS`]. Rows are fixed at 40.
    pub fn for_ink_density(ink_density: f32) -> Self {
        let raw = (BASE_COLUMNS * ink_density / 5.0).floor();
        // NaN and negatives both fall through to a single column.
        let columns = if raw >= 1.0 {
            (raw as usize).min(MAX_COLUMNS)
        } else {
            1
        };
        Self {
            columns,
            rows: GRID_ROWS,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.columns.saturating_mul(self.rows)
    }
}

/// Settings for the headless command line driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub visualizer: VisualizerConfig,
    pub surface: SurfaceConfig,
}

impl AppConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::from_json(&std::fs::read_to_string(path)?)?;
        tracing::info!(path = %path.display(), "preset loaded");
        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            visualizer: VisualizerConfig::default(),
            surface: SurfaceConfig::default(),
        }
    }
}

/// Dimensions and pacing of the offscreen render surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub width: usize,
    pub height: usize,
    pub fps: u32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 548,
            fps: 60,
        }
    }
}
