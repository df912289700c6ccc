use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

/// Number of energy bins exposed per snapshot.
pub const SPECTRUM_BINS: usize = 256;
/// Analysis window length in samples.
pub const FFT_SIZE: usize = SPECTRUM_BINS * 2;

const SMOOTHING: f32 = 0.8;
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Fixed-length view of the spectral energy at one instant, 0..=255 per bin.
#[derive(Clone, PartialEq, Eq)]
pub struct SpectrumSnapshot {
    bins: [u8; SPECTRUM_BINS],
}

impl SpectrumSnapshot {
    pub fn silent() -> Self {
        Self::filled(0)
    }

    pub fn filled(energy: u8) -> Self {
        Self {
            bins: [energy; SPECTRUM_BINS],
        }
    }

    pub fn from_bins(bins: [u8; SPECTRUM_BINS]) -> Self {
        Self { bins }
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    /// Energy of `bin`, or zero past the end.
    pub fn energy(&self, bin: usize) -> u8 {
        self.bins.get(bin).copied().unwrap_or(0)
    }

    pub fn is_silent(&self) -> bool {
        self.bins.iter().all(|&energy| energy == 0)
    }

    pub fn summary(&self) -> SpectrumSummary {
        let (peak_bin, peak_energy) = self
            .bins
            .iter()
            .copied()
            .enumerate()
            .max_by_key(|&(index, energy)| (energy, std::cmp::Reverse(index)))
            .unwrap_or((0, 0));
        let total: u32 = self.bins.iter().map(|&energy| energy as u32).sum();
        SpectrumSummary {
            peak_bin,
            peak_energy,
            mean_energy: total as f32 / SPECTRUM_BINS as f32,
        }
    }
}

impl Default for SpectrumSnapshot {
    fn default() -> Self {
        Self::silent()
    }
}

impl fmt::Debug for SpectrumSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumSnapshot")
            .field("summary", &self.summary())
            .finish()
    }
}

/// Compact description of a snapshot for logs and the command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumSummary {
    pub peak_bin: usize,
    pub peak_energy: u8,
    pub mean_energy: f32,
}

/// Byte-scaled magnitude spectrum with temporal smoothing.
///
/// Every call to [`SpectrumAnalyser::analyse`] windows the most recent
/// [`FFT_SIZE`] samples, blends the magnitudes with the previous call and maps
/// the resulting decibels onto `0..=255`.
pub struct SpectrumAnalyser {
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyser {
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(FFT_SIZE);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        let window = (0..FFT_SIZE).map(|i| blackman_value(i, FFT_SIZE)).collect();

        Self {
            plan,
            input,
            spectrum,
            scratch,
            window,
            smoothed: vec![0.0; SPECTRUM_BINS],
        }
    }

    /// Forgets the smoothing history.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|value| *value = 0.0);
    }

    /// Analyses the trailing `FFT_SIZE` samples of `samples`. Shorter input is
    /// zero padded at the front.
    pub fn analyse(&mut self, samples: &[f32]) -> SpectrumSnapshot {
        let take = samples.len().min(FFT_SIZE);
        let pad = FFT_SIZE - take;
        let tail = &samples[samples.len() - take..];

        self.input[..pad].iter_mut().for_each(|value| *value = 0.0);
        for (offset, sample) in tail.iter().enumerate() {
            let index = pad + offset;
            self.input[index] = *sample * self.window[index];
        }

        if self
            .plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .is_err()
        {
            return SpectrumSnapshot::silent();
        }

        let mut bins = [0u8; SPECTRUM_BINS];
        let scale = 1.0 / FFT_SIZE as f32;
        for (index, bin) in bins.iter_mut().enumerate() {
            let magnitude = self.spectrum[index].norm() * scale;
            let smoothed = SMOOTHING * self.smoothed[index] + (1.0 - SMOOTHING) * magnitude;
            self.smoothed[index] = if smoothed.is_finite() { smoothed } else { 0.0 };
            *bin = to_byte(self.smoothed[index]);
        }

        SpectrumSnapshot::from_bins(bins)
    }
}

impl Default for SpectrumAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("fft_size", &FFT_SIZE)
            .field("bins", &SPECTRUM_BINS)
            .finish()
    }
}

fn to_byte(magnitude: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let decibels = 20.0 * magnitude.log10();
    let scaled = 255.0 * (decibels - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
    scaled.clamp(0.0, 255.0) as u8
}

fn blackman_value(index: usize, len: usize) -> f32 {
    let phase = 2.0 * PI * index as f32 / len as f32;
    0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency_bin: usize, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * frequency_bin as f32 * i as f32 / FFT_SIZE as f32).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_zero() {
        let mut analyser = SpectrumAnalyser::new();
        let snapshot = analyser.analyse(&vec![0.0; FFT_SIZE]);
        assert!(snapshot.is_silent());
        assert_eq!(snapshot.bins().len(), SPECTRUM_BINS);
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let mut analyser = SpectrumAnalyser::new();
        let tone = sine(20, 0.8, FFT_SIZE);
        let mut snapshot = SpectrumSnapshot::silent();
        for _ in 0..20 {
            snapshot = analyser.analyse(&tone);
        }

        let summary = snapshot.summary();
        assert!((19..=21).contains(&summary.peak_bin), "{summary:?}");
        assert!(summary.peak_energy > 200);
        assert!(snapshot.energy(200) < summary.peak_energy);
    }

    #[test]
    fn smoothing_ramps_up_over_calls() {
        let mut analyser = SpectrumAnalyser::new();
        let tone = sine(10, 0.5, FFT_SIZE);
        let first = analyser.analyse(&tone).energy(10);
        let later = (0..10).map(|_| analyser.analyse(&tone).energy(10)).last().unwrap();
        assert!(later >= first);

        analyser.reset();
        assert!(analyser.analyse(&vec![0.0; FFT_SIZE]).is_silent());
    }

    #[test]
    fn short_input_is_padded() {
        let mut analyser = SpectrumAnalyser::new();
        let snapshot = analyser.analyse(&sine(30, 0.5, 64));
        assert_eq!(snapshot.bins().len(), SPECTRUM_BINS);
        assert!(analyser.analyse(&[]).bins().len() == SPECTRUM_BINS);
    }

    #[test]
    fn summary_reports_peak() {
        let mut bins = [0u8; SPECTRUM_BINS];
        bins[42] = 200;
        bins[43] = 100;
        let summary = SpectrumSnapshot::from_bins(bins).summary();
        assert_eq!(summary.peak_bin, 42);
        assert_eq!(summary.peak_energy, 200);
        assert!((summary.mean_energy - 300.0 / 256.0).abs() < 1e-4);
    }
}
