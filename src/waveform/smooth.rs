use super::fallback;
use super::AssetKey;

const RADIUS: usize = 2;

/// Centered moving average over `2 * RADIUS + 1` bars, window truncated at
/// the edges. Output has the same length as the input.
pub fn smooth(levels: &[f64]) -> Vec<f64> {
    let n = levels.len();
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(RADIUS);
            let end = (i + RADIUS + 1).min(n);
            let window = &levels[start..end];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect()
}

/// Linearly interpolate `levels` onto `new_len` evenly spaced points.
///
/// An empty input has nothing to interpolate, so the asset's fallback
/// waveform is returned instead.
pub fn resample(levels: &[f64], new_len: usize, asset: &AssetKey) -> Vec<f64> {
    if new_len == 0 {
        return Vec::new();
    }
    if levels.is_empty() {
        log::debug!("Resampling empty bars for asset {}; using fallback", asset.id);
        return fallback::generate(asset, new_len);
    }
    if levels.len() == 1 {
        return vec![levels[0]; new_len];
    }

    let last = (levels.len() - 1) as f64;
    (0..new_len)
        .map(|j| {
            let t = if new_len > 1 {
                j as f64 / (new_len - 1) as f64
            } else {
                0.0
            };
            let pos = t * last;
            let lo = (pos.floor() as usize).min(levels.len() - 1);
            let hi = (lo + 1).min(levels.len() - 1);
            let frac = pos - lo as f64;
            levels[lo] + (levels[hi] - levels[lo]) * frac
        })
        .collect()
}
