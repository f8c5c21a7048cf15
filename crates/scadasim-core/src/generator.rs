//! Waveform generator
//!
//! Each measure follows its own slow sine wave around a random base value,
//! with a little uniform noise on top. Samples are clamped to the configured
//! bounds and carry an OPC-style quality code.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::f64::consts::TAU;

/// OPC quality code for a good sample
pub const QUALITY_GOOD: i16 = 192;

/// OPC quality code for a bad or stale sample
pub const QUALITY_BAD: i16 = 0;

/// Share of samples flagged good
const GOOD_RATIO: f64 = 0.9;

/// Value bounds and noise for generated samples
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Bounds {
    /// Lowest value a sample may take
    #[serde(rename = "value_min")]
    pub min: f64,
    /// Highest value a sample may take
    #[serde(rename = "value_max")]
    pub max: f64,
    /// Peak-to-peak width of the uniform noise added to each step
    pub noise_amplitude: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: 40.0,
            max: 95.0,
            noise_amplitude: 0.5,
        }
    }
}

impl Bounds {
    /// Create bounds
    pub fn new(min: f64, max: f64, noise_amplitude: f64) -> Self {
        Self {
            min,
            max,
            noise_amplitude,
        }
    }

    /// Width of the value range
    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

/// Per-measure waveform state
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureState {
    /// Center of the wave
    pub base: f64,
    /// Current phase in radians
    pub phase: f64,
    /// Wave period
    pub period_minutes: u32,
    /// Wave amplitude
    pub amplitude: f64,
}

/// One generated sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Measured value
    pub value: f64,
    /// Quality code, [`QUALITY_GOOD`] or [`QUALITY_BAD`]
    pub quality: i16,
}

impl Sample {
    /// Whether the sample is flagged good
    pub fn is_good(&self) -> bool {
        self.quality == QUALITY_GOOD
    }
}

/// Sine-plus-noise sample generator
///
/// Owns the random source used for every draw of a run, so a seeded
/// generator replays the same run.
#[derive(Debug)]
pub struct WaveformGenerator<R: Rng = StdRng> {
    bounds: Bounds,
    rng: R,
}

impl WaveformGenerator<StdRng> {
    /// Create a generator seeded from OS entropy
    pub fn new(bounds: Bounds) -> Self {
        Self::with_rng(bounds, StdRng::from_entropy())
    }

    /// Create a generator with a fixed seed
    pub fn seeded(bounds: Bounds, seed: u64) -> Self {
        Self::with_rng(bounds, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> WaveformGenerator<R> {
    /// Create a generator around an existing random source
    pub fn with_rng(bounds: Bounds, rng: R) -> Self {
        Self { bounds, rng }
    }

    /// Draw the initial state for one measure
    pub fn initialize(&mut self) -> MeasureState {
        let range = self.bounds.range();
        let base = self.bounds.min + self.rng.gen::<f64>() * range;
        let phase = self.rng.gen::<f64>() * TAU;
        let period_minutes = self.rng.gen_range(60..360);
        let amplitude = range * (0.25 + self.rng.gen::<f64>() * 0.4);

        MeasureState {
            base,
            phase,
            period_minutes,
            amplitude,
        }
    }

    /// Step a measure forward by one interval and produce its sample
    pub fn advance(&mut self, state: &mut MeasureState, interval_minutes: u32) -> Sample {
        state.phase += TAU * f64::from(interval_minutes) / f64::from(state.period_minutes);

        let mut raw = state.base + state.amplitude * state.phase.sin();
        raw += (self.rng.gen::<f64>() - 0.5) * self.bounds.noise_amplitude;
        let value = raw.clamp(self.bounds.min, self.bounds.max);

        let quality = if self.rng.gen::<f64>() < GOOD_RATIO {
            QUALITY_GOOD
        } else {
            QUALITY_BAD
        };

        Sample { value, quality }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bounds() {
        let bounds = Bounds::default();
        assert_eq!(bounds.min, 40.0);
        assert_eq!(bounds.max, 95.0);
        assert_eq!(bounds.noise_amplitude, 0.5);
        assert_eq!(bounds.range(), 55.0);
    }

    #[test]
    fn test_initialize_ranges() {
        let bounds = Bounds::new(10.0, 20.0, 0.0);
        let mut generator = WaveformGenerator::seeded(bounds, 7);

        for _ in 0..1_000 {
            let state = generator.initialize();
            assert!((10.0..20.0).contains(&state.base));
            assert!((0.0..TAU).contains(&state.phase));
            assert!((60..360).contains(&state.period_minutes));
            assert!(state.amplitude >= 2.5 && state.amplitude < 6.5);
        }
    }

    #[test]
    fn test_advance_moves_phase() {
        let mut generator = WaveformGenerator::seeded(Bounds::default(), 1);
        let mut state = MeasureState {
            base: 60.0,
            phase: 0.0,
            period_minutes: 120,
            amplitude: 10.0,
        };

        generator.advance(&mut state, 30);
        assert!((state.phase - TAU / 4.0).abs() < 1e-12);

        generator.advance(&mut state, 120);
        assert!((state.phase - TAU * 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_noise_free_sample_follows_sine() {
        let mut generator = WaveformGenerator::seeded(Bounds::new(0.0, 100.0, 0.0), 3);
        let mut state = MeasureState {
            base: 50.0,
            phase: 0.0,
            period_minutes: 240,
            amplitude: 20.0,
        };

        let sample = generator.advance(&mut state, 60);
        assert!((sample.value - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamped_to_bounds() {
        let mut generator = WaveformGenerator::seeded(Bounds::new(40.0, 95.0, 0.0), 5);
        let mut state = MeasureState {
            base: 90.0,
            phase: 0.0,
            period_minutes: 240,
            amplitude: 50.0,
        };

        // quarter period puts the crest far above max
        assert_eq!(generator.advance(&mut state, 60).value, 95.0);
        // three quarters puts the trough far below min
        assert_eq!(generator.advance(&mut state, 120).value, 40.0);
    }

    #[test]
    fn test_seeded_generators_agree() {
        let mut a = WaveformGenerator::seeded(Bounds::default(), 42);
        let mut b = WaveformGenerator::seeded(Bounds::default(), 42);

        let mut sa = a.initialize();
        let mut sb = b.initialize();
        assert_eq!(sa, sb);

        for _ in 0..100 {
            assert_eq!(a.advance(&mut sa, 1), b.advance(&mut sb, 1));
        }
    }
}
