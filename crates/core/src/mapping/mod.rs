//! Per-cell mapping from audio energy, pointer proximity and noise to a
//! displaced position, size and opacity.

use noise::{NoiseFn, OpenSimplex};
use serde::{Deserialize, Serialize};

use crate::{PointerState, SpectrumSnapshot, VisualizerError, SPECTRUM_BINS};

/// Pointer influence vanishes at this distance.
pub const INTERACTION_RADIUS: f32 = 250.0;
/// Displacement applied to a cell sitting exactly under the pointer.
pub const MAX_POINTER_DISPLACEMENT: f32 = 80.0;
/// Vertical amplitude of the procedural noise.
pub const NOISE_AMPLITUDE: f32 = 30.0;
/// Share of the spectrum spread across the columns (low end only).
pub const SPECTRUM_SPAN: f32 = 0.4;
/// Time advanced per frame at `flow = 50`.
pub const BASE_TIME_STEP: f32 = 0.005;

/// Deterministic, time-continuous 2D noise sampled on grid coordinates.
/// Implementations must return values in `[-1, 1]`.
pub trait NoiseField: Send {
    fn sample(&self, column: f32, row: f32, time: f32) -> f32;
}

/// Product of a sine on columns and a cosine on rows, both drifting in time.
#[derive(Debug, Default, Clone, Copy)]
pub struct WaveNoise;

impl NoiseField for WaveNoise {
    fn sample(&self, column: f32, row: f32, time: f32) -> f32 {
        (column * 0.1 + time).sin() * (row * 0.15 + time * 0.8).cos()
    }
}

/// OpenSimplex noise over `(column, row, time)`.
pub struct SimplexNoise {
    simplex: OpenSimplex,
}

impl SimplexNoise {
    pub fn new(seed: u32) -> Self {
        Self {
            simplex: OpenSimplex::new(seed),
        }
    }
}

impl NoiseField for SimplexNoise {
    fn sample(&self, column: f32, row: f32, time: f32) -> f32 {
        let value = self
            .simplex
            .get([column as f64 * 0.1, row as f64 * 0.15, time as f64]);
        (value as f32).clamp(-1.0, 1.0)
    }
}

impl std::fmt::Debug for SimplexNoise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimplexNoise").finish()
    }
}

/// Selects the noise implementation used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseKind {
    #[default]
    Wave,
    Simplex,
}

impl NoiseKind {
    pub fn build(self) -> Box<dyn NoiseField> {
        match self {
            NoiseKind::Wave => Box::new(WaveNoise),
            NoiseKind::Simplex => Box::new(SimplexNoise::new(0)),
        }
    }
}

impl std::str::FromStr for NoiseKind {
    type Err = VisualizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wave" => Ok(NoiseKind::Wave),
            "simplex" => Ok(NoiseKind::Simplex),
            other => Err(VisualizerError::msg(format!("unknown noise `{other}`"))),
        }
    }
}

/// Amount `elapsed_time` advances by in one frame. A non-finite flow
/// freezes time instead of poisoning the clock.
pub fn time_step(flow: f32) -> f32 {
    let step = BASE_TIME_STEP * (flow / 50.0);
    if step.is_finite() {
        step
    } else {
        0.0
    }
}

/// Spectrum bin read by `column`: linear over the lowest 40% of the bins.
pub fn spectrum_bin(column: usize, columns: usize) -> usize {
    let columns = columns.max(1);
    let scaled = (column as f32 / columns as f32) * SPECTRUM_BINS as f32 * SPECTRUM_SPAN;
    (scaled.floor() as usize).min(SPECTRUM_BINS - 1)
}

/// Upward shift of a column caused by its spectrum bin, `energy * flow * 2`.
pub fn audio_displacement(
    spectrum: &SpectrumSnapshot,
    column: usize,
    columns: usize,
    flow: f32,
) -> f32 {
    let energy = spectrum.energy(spectrum_bin(column, columns)) as f32 / 255.0;
    let shift = energy * flow * 2.0;
    if shift.is_finite() {
        shift
    } else {
        0.0
    }
}

/// Magnitude of the pointer push at `distance`. 80 at zero, falling linearly
/// to 0 at the interaction radius and beyond.
pub fn pointer_magnitude(distance: f32) -> f32 {
    if distance < INTERACTION_RADIUS {
        (1.0 - distance / INTERACTION_RADIUS) * MAX_POINTER_DISPLACEMENT
    } else {
        0.0
    }
}

/// Vertical offset pulling the cell at `(x, y)` towards the pointer.
pub fn pointer_offset(pointer: PointerState, x: f32, y: f32) -> f32 {
    let Some((px, py)) = pointer.position() else {
        return 0.0;
    };
    let dx = px - x;
    let dy = py - y;
    let distance = (dx * dx + dy * dy).sqrt();
    let magnitude = pointer_magnitude(distance);
    if magnitude == 0.0 {
        return 0.0;
    }
    dy / (distance + 1.0) * magnitude
}

/// `|y - h/2| / (h/2)` clamped into `[0, 1]`.
pub fn center_distance(y: f32, height: f32) -> f32 {
    let half = height / 2.0;
    if half.is_nan() || half <= 0.0 {
        return 1.0;
    }
    let distance = (y - half).abs() / half;
    if distance.is_nan() {
        1.0
    } else {
        distance.clamp(0.0, 1.0)
    }
}

pub fn cell_size(particle_size: f32, distance: f32) -> f32 {
    ((particle_size / 50.0) * 3.0 * (1.5 - distance)).max(0.1)
}

pub fn cell_alpha(exposure: f32, distance: f32) -> f32 {
    ((1.0 - distance) * (exposure / 100.0)).max(0.0)
}

/// Everything a single cell needs from the frame.
#[derive(Debug, Clone, Copy)]
pub struct CellInput<'a> {
    pub row: usize,
    pub column: usize,
    pub columns: usize,
    pub cell_width: f32,
    pub cell_height: f32,
    pub surface_height: f32,
    pub particle_size: f32,
    pub exposure: f32,
    pub flow: f32,
    pub time: f32,
    /// Present only when audio is loaded and playing.
    pub spectrum: Option<&'a SpectrumSnapshot>,
    pub pointer: PointerState,
}

/// Geometry and opacity of one cell for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellTransform {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub alpha: f32,
    pub center_distance: f32,
}

pub fn map_cell(input: &CellInput<'_>, noise: &dyn NoiseField) -> CellTransform {
    let base_x = input.column as f32 * input.cell_width;
    let base_y = input.row as f32 * input.cell_height;

    let audio = input
        .spectrum
        .map(|spectrum| audio_displacement(spectrum, input.column, input.columns, input.flow))
        .unwrap_or(0.0);
    let pointer = pointer_offset(input.pointer, base_x, base_y);
    let wobble = noise.sample(input.column as f32, input.row as f32, input.time) * NOISE_AMPLITUDE;

    let y = base_y + wobble - audio + pointer;
    let distance = center_distance(y, input.surface_height);

    CellTransform {
        x: base_x,
        y,
        size: cell_size(input.particle_size, distance),
        alpha: cell_alpha(input.exposure, distance),
        center_distance: distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flat;

    impl NoiseField for Flat {
        fn sample(&self, _: f32, _: f32, _: f32) -> f32 {
            0.0
        }
    }

    fn input<'a>(spectrum: Option<&'a SpectrumSnapshot>) -> CellInput<'a> {
        CellInput {
            row: 20,
            column: 10,
            columns: 84,
            cell_width: 10.0,
            cell_height: 10.0,
            surface_height: 400.0,
            particle_size: 40.0,
            exposure: 75.0,
            flow: 65.0,
            time: 0.0,
            spectrum,
            pointer: PointerState::Away,
        }
    }

    #[test]
    fn pointer_falloff_is_monotonic() {
        assert_eq!(pointer_magnitude(0.0), 80.0);
        assert_eq!(pointer_magnitude(250.0), 0.0);
        assert_eq!(pointer_magnitude(10_000.0), 0.0);

        let mut previous = f32::INFINITY;
        for step in 0..=300 {
            let magnitude = pointer_magnitude(step as f32);
            assert!(magnitude <= previous);
            previous = magnitude;
        }
    }

    #[test]
    fn pointer_pulls_towards_itself() {
        let below = PointerState::Over { x: 0.0, y: 100.0 };
        assert!(pointer_offset(below, 0.0, 50.0) > 0.0);

        let above = PointerState::Over { x: 0.0, y: 0.0 };
        assert!(pointer_offset(above, 0.0, 50.0) < 0.0);

        assert_eq!(pointer_offset(PointerState::Away, 0.0, 50.0), 0.0);
        assert_eq!(pointer_offset(below, 0.0, 100.0), 0.0);
    }

    #[test]
    fn center_distance_is_clamped() {
        for y in [-1.0e9, -500.0, 0.0, 200.0, 399.0, 1.0e9, f32::INFINITY] {
            let d = center_distance(y, 400.0);
            assert!((0.0..=1.0).contains(&d), "{y} -> {d}");
        }
        assert_eq!(center_distance(200.0, 400.0), 0.0);
        assert_eq!(center_distance(f32::NAN, 400.0), 1.0);
        assert_eq!(center_distance(10.0, 0.0), 1.0);
    }

    #[test]
    fn size_and_alpha_guards() {
        assert_eq!(cell_size(-100.0, 0.0), 0.1);
        assert!((cell_size(50.0, 0.5) - 3.0).abs() < 1e-6);
        assert_eq!(cell_alpha(-20.0, 0.0), 0.0);
        assert!((cell_alpha(100.0, 0.25) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn spectrum_bins_cover_lowest_share() {
        assert_eq!(spectrum_bin(0, 84), 0);
        let last = spectrum_bin(83, 84);
        assert!(last < 103);
        assert_eq!(spectrum_bin(0, 0), 0);
    }

    #[test]
    fn flow_zero_freezes_time_and_audio() {
        assert_eq!(time_step(0.0), 0.0);
        let loud = SpectrumSnapshot::filled(255);
        assert_eq!(audio_displacement(&loud, 5, 84, 0.0), 0.0);
    }

    #[test]
    fn non_finite_flow_is_inert() {
        let loud = SpectrumSnapshot::filled(255);
        let silent = SpectrumSnapshot::silent();
        for flow in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert_eq!(time_step(flow), 0.0);
            assert_eq!(audio_displacement(&loud, 5, 84, flow), 0.0);
            assert_eq!(audio_displacement(&silent, 5, 84, flow), 0.0);
        }
    }

    #[test]
    fn audio_lifts_cells() {
        let loud = SpectrumSnapshot::filled(255);
        let quiet = map_cell(&input(None), &Flat);
        let lifted = map_cell(&input(Some(&loud)), &Flat);
        assert!((quiet.y - lifted.y - 130.0).abs() < 1e-3);
    }

    #[test]
    fn wave_noise_is_bounded_and_deterministic() {
        let noise = WaveNoise;
        for c in 0..20 {
            for r in 0..20 {
                let value = noise.sample(c as f32, r as f32, 1.7);
                assert!((-1.0..=1.0).contains(&value));
                assert_eq!(value, noise.sample(c as f32, r as f32, 1.7));
            }
        }
    }

    #[test]
    fn simplex_noise_is_bounded() {
        let noise = NoiseKind::Simplex.build();
        for c in 0..16 {
            let value = noise.sample(c as f32, 3.0, 0.25);
            assert!((-1.0..=1.0).contains(&value));
        }
    }
}
