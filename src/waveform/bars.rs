use rand::Rng;

use super::{CEIL, FLOOR};
use crate::audio::decode::DecodedAudio;

/// Below this RMS a chunk is treated as digital silence.
const SILENCE_RMS: f64 = 1e-8;
/// dBFS mapped onto the floor level; 0 dBFS maps onto the ceiling.
const DB_RANGE: f64 = 60.0;
/// Audible chunks that land under this level get a little jitter so quiet
/// passages don't render as a ruler-flat line.
const NEAR_SILENT_LEVEL: f64 = FLOOR + 5.0;
const JITTER: f64 = 3.0;

pub const MIN_ADAPTIVE_BARS: usize = 40;
pub const MAX_SHORT_BARS: usize = 80;
pub const MAX_BARS: usize = 200;
const SHORT_TRACK_SECS: f64 = 30.0;
const LONG_TRACK_SECS: f64 = 600.0;

/// Scale the bar count with track length so density stays roughly constant.
pub fn adapt_bar_count(base: usize, duration: Option<f64>) -> usize {
    match duration {
        Some(secs) if secs.is_finite() && secs > 0.0 && secs < SHORT_TRACK_SECS => {
            let target = (2.0 * secs).round() as usize;
            target
                .clamp(MIN_ADAPTIVE_BARS, MAX_SHORT_BARS)
                .min(base.max(MIN_ADAPTIVE_BARS))
        }
        Some(secs) if secs.is_finite() && secs > LONG_TRACK_SECS => {
            let cap = base.saturating_mul(2).min(MAX_BARS).max(base);
            let target = (base as f64 * secs / LONG_TRACK_SECS).ceil() as usize;
            target.clamp(base, cap)
        }
        _ => base,
    }
}

/// Reduce `audio` to exactly `num_bars` levels in `[10, 100]`.
///
/// Samples are split into equal contiguous chunks (the last one takes the
/// remainder); each chunk's RMS is converted to dBFS and mapped linearly from
/// [-60, 0] dB onto the display range.
pub fn aggregate<R: Rng + ?Sized>(audio: &DecodedAudio, num_bars: usize, rng: &mut R) -> Vec<f64> {
    if num_bars == 0 {
        return Vec::new();
    }

    let samples = &audio.samples;
    let len = samples.len();
    let chunk_size = (len / num_bars).max(1);

    (0..num_bars)
        .map(|i| {
            let start = (i * chunk_size).min(len);
            let end = if i == num_bars - 1 {
                len
            } else {
                ((i + 1) * chunk_size).min(len)
            };

            let rms = chunk_rms(&samples[start..end]);
            let level = rms_to_level(rms);
            if rms > SILENCE_RMS && level < NEAR_SILENT_LEVEL {
                (level + rng.random_range(0.0..JITTER)).min(CEIL)
            } else {
                level
            }
        })
        .collect()
}

fn chunk_rms(chunk: &[f32]) -> f64 {
    if chunk.is_empty() {
        return 0.0;
    }
    let energy: f64 = chunk.iter().map(|&s| s as f64 * s as f64).sum();
    (energy / chunk.len() as f64).sqrt()
}

fn rms_to_level(rms: f64) -> f64 {
    if !(rms > SILENCE_RMS) {
        return FLOOR;
    }
    let db = 20.0 * rms.log10();
    let level = FLOOR + (db + DB_RANGE) / DB_RANGE * (CEIL - FLOOR);
    if level.is_finite() {
        level.clamp(FLOOR, CEIL)
    } else {
        FLOOR
    }
}
