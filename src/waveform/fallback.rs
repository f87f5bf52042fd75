//! Synthetic waveforms for assets that can't be analyzed.
//!
//! Output depends only on the asset's id and title, so a track that keeps
//! failing analysis always shows the same picture.

use std::f64::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::smooth::smooth;
use super::{AssetKey, WaveformBars, CEIL, FLOOR};

const BASE_LEVEL: f64 = 15.0;
const SPAN: f64 = 65.0;
const NOISE: f64 = 6.0;
const PEAK_FRACTION: f64 = 0.03;
const PEAK_GAIN: f64 = 1.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shape {
    DecayingSine,
    RhythmicPulse,
    DualFrequency,
    AmplitudeModulated,
}

impl Shape {
    fn for_id(id: u64) -> Self {
        match id % 4 {
            0 => Shape::DecayingSine,
            1 => Shape::RhythmicPulse,
            2 => Shape::DualFrequency,
            _ => Shape::AmplitudeModulated,
        }
    }

    /// Envelope at position `x` in [0, 1], roughly within [0, 1].
    fn eval(self, x: f64) -> f64 {
        match self {
            Shape::DecayingSine => (0.55 + 0.45 * (TAU * 2.5 * x).sin()) * (1.0 - 0.6 * x),
            Shape::RhythmicPulse => 0.15 + 0.75 * (TAU * 8.0 * x).sin().abs().powf(0.6),
            Shape::DualFrequency => {
                0.5 + 0.25 * (TAU * 1.5 * x).sin() + 0.2 * (TAU * 7.0 * x + 0.8).sin()
            }
            Shape::AmplitudeModulated => {
                (0.5 + 0.4 * (TAU * 1.2 * x).sin()) * (0.55 + 0.45 * (TAU * 9.0 * x).sin())
            }
        }
    }
}

/// Raw fallback levels for `asset`, already smoothed and within `[10, 100]`.
pub fn generate(asset: &AssetKey, num_bars: usize) -> Vec<f64> {
    if num_bars == 0 {
        return Vec::new();
    }

    let mut rng = StdRng::seed_from_u64(asset.seed().value());
    let shape = Shape::for_id(asset.id);
    let offset = (asset.id % 7) as f64 * 1.5;

    let mut levels: Vec<f64> = (0..num_bars)
        .map(|i| {
            let x = if num_bars > 1 {
                i as f64 / (num_bars - 1) as f64
            } else {
                0.0
            };
            let envelope = shape.eval(x).clamp(0.0, 1.0);
            let noise = rng.random_range(-NOISE..NOISE);
            (BASE_LEVEL + SPAN * envelope + offset + noise).clamp(FLOOR, CEIL)
        })
        .collect();

    let peaks = (num_bars as f64 * PEAK_FRACTION).floor() as usize;
    for _ in 0..peaks {
        let i = rng.random_range(0..num_bars);
        levels[i] = (levels[i] * PEAK_GAIN).min(CEIL);
    }

    smooth(&levels)
        .into_iter()
        .map(|v| v.clamp(FLOOR, CEIL))
        .collect()
}

pub fn waveform(asset: &AssetKey, num_bars: usize) -> WaveformBars {
    WaveformBars::from_levels(&generate(asset, num_bars))
}
