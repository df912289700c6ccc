use std::fmt;

use crate::{
    mapping::{self, CellInput, NoiseField, NoiseKind},
    render::{BlendMode, Canvas},
    scene::{self, Paint, ShapeRule},
    ColorGrid, GridDims, PointerState, Rgb, SpectrumSnapshot, VisualizerConfig,
};

const BACKGROUND: Rgb = Rgb::hex(0x0f172a);
const GUIDE_SPACING: usize = 50;
const GUIDE_ALPHA: f32 = 0.02;

/// Lifecycle of the engine's binding to a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Not bound to a surface yet.
    Idle,
    /// Drawing every frame.
    Running,
    /// Torn down. Terminal.
    Stopped,
}

/// Consistent view of everything a frame reads.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs<'a> {
    pub config: &'a VisualizerConfig,
    pub pointer: PointerState,
    /// Latest energy, `None` when no audio is loaded.
    pub spectrum: Option<&'a SpectrumSnapshot>,
    /// Image colors, `None` when no image is loaded.
    pub colors: Option<&'a ColorGrid>,
}

impl<'a> FrameInputs<'a> {
    pub fn new(config: &'a VisualizerConfig) -> Self {
        Self {
            config,
            pointer: PointerState::Away,
            spectrum: None,
            colors: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotRunning,
    EmptySurface,
}

/// What a single frame did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub dims: GridDims,
    pub drawn: usize,
    pub skipped: Option<SkipReason>,
    pub elapsed_time: f32,
}

/// Per-frame renderer of the particle grid.
///
/// Holds only animation state (the noise clock and lifecycle). Configuration,
/// pointer, spectrum and colors arrive as a [`FrameInputs`] value on every
/// call, so changes apply on the very next frame.
pub struct ParticleFieldEngine {
    state: EngineState,
    elapsed_time: f32,
    noise_kind: NoiseKind,
    noise: Box<dyn NoiseField>,
    frames_drawn: u64,
}

impl ParticleFieldEngine {
    pub fn new() -> Self {
        Self {
            state: EngineState::Idle,
            elapsed_time: 0.0,
            noise_kind: NoiseKind::Wave,
            noise: NoiseKind::Wave.build(),
            frames_drawn: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn elapsed_time(&self) -> f32 {
        self.elapsed_time
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Enters `Running`. Returns `false` once the engine has been stopped.
    pub fn bind(&mut self) -> bool {
        match self.state {
            EngineState::Idle => {
                tracing::info!("particle field bound to surface");
                self.state = EngineState::Running;
                true
            }
            EngineState::Running => true,
            EngineState::Stopped => {
                tracing::warn!("cannot rebind a stopped particle field");
                false
            }
        }
    }

    pub fn stop(&mut self) {
        if self.state != EngineState::Stopped {
            tracing::info!(frames = self.frames_drawn, "particle field stopped");
            self.state = EngineState::Stopped;
        }
    }

    /// Renders one frame into `canvas`.
    pub fn render_frame(&mut self, inputs: &FrameInputs<'_>, canvas: &mut dyn Canvas) -> FrameReport {
        let config = inputs.config;
        let dims = config.grid_dims();
        let mut report = FrameReport {
            dims,
            drawn: 0,
            skipped: None,
            elapsed_time: self.elapsed_time,
        };

        if self.state != EngineState::Running {
            report.skipped = Some(SkipReason::NotRunning);
            return report;
        }

        let (width, height) = canvas.size();
        if width == 0 || height == 0 {
            tracing::trace!("surface not laid out, skipping frame");
            report.skipped = Some(SkipReason::EmptySurface);
            return report;
        }

        if config.noise != self.noise_kind {
            self.noise_kind = config.noise;
            self.noise = config.noise.build();
        }
        let advanced = self.elapsed_time + mapping::time_step(config.flow);
        if advanced.is_finite() {
            self.elapsed_time = advanced;
        }
        report.elapsed_time = self.elapsed_time;

        draw_background(canvas, width, height);

        let width = width as f32;
        let height = height as f32;
        let variant = scene::resolve(config.style);
        let spectrum = inputs.spectrum.filter(|_| config.is_audio_playing);
        let colors = inputs.colors.filter(|grid| grid.dims() == dims);

        let cell_width = width / dims.columns as f32;
        let cell_height = height / dims.rows as f32;

        for row in 0..dims.rows {
            for column in 0..dims.columns {
                let cell = mapping::map_cell(
                    &CellInput {
                        row,
                        column,
                        columns: dims.columns,
                        cell_width,
                        cell_height,
                        surface_height: height,
                        particle_size: config.particle_size,
                        exposure: config.exposure,
                        flow: config.flow,
                        time: self.elapsed_time,
                        spectrum,
                        pointer: inputs.pointer,
                    },
                    self.noise.as_ref(),
                );

                let paint = colors
                    .and_then(|grid| grid.get(row, column))
                    .map(Paint::opaque)
                    .unwrap_or_else(|| variant.palette.paint(row, column, cell.center_distance));
                let alpha = cell.alpha * paint.opacity;

                match variant.shape {
                    ShapeRule::Circle => {
                        canvas.fill_circle((cell.x, cell.y), cell.size, paint.rgb, alpha, BlendMode::Screen)
                    }
                    ShapeRule::Square => {
                        canvas.fill_square((cell.x, cell.y), cell.size, paint.rgb, alpha, BlendMode::Screen)
                    }
                }
                report.drawn += 1;
            }
        }

        self.frames_drawn += 1;
        tracing::trace!(drawn = report.drawn, time = self.elapsed_time, "frame rendered");
        report
    }
}

impl Default for ParticleFieldEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ParticleFieldEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleFieldEngine")
            .field("state", &self.state)
            .field("elapsed_time", &self.elapsed_time)
            .field("noise", &self.noise_kind)
            .field("frames_drawn", &self.frames_drawn)
            .finish()
    }
}

fn draw_background(canvas: &mut dyn Canvas, width: usize, height: usize) {
    canvas.clear(BACKGROUND);
    let (w, h) = (width as f32, height as f32);
    for x in (0..width).step_by(GUIDE_SPACING) {
        canvas.stroke_line((x as f32, 0.0), (x as f32, h), Rgb::WHITE, GUIDE_ALPHA);
    }
    for y in (0..height).step_by(GUIDE_SPACING) {
        canvas.stroke_line((0.0, y as f32), (w, y as f32), Rgb::WHITE, GUIDE_ALPHA);
    }
}
