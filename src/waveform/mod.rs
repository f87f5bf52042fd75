//! Turning decoded audio into display bars, and everything that shapes them.

pub mod bars;
pub mod fallback;
pub mod smooth;

use serde::{Deserialize, Serialize};

pub const FLOOR: f64 = 10.0;
pub const CEIL: f64 = 100.0;

/// Fixed-length display levels, each within `[10, 100]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct WaveformBars(Vec<u8>);

impl WaveformBars {
    /// Round, clamp and sanitize raw levels. Non-finite values land on the floor.
    pub fn from_levels(levels: &[f64]) -> Self {
        let bars = levels
            .iter()
            .map(|&v| if v.is_finite() { v.round().clamp(FLOOR, CEIL) as u8 } else { FLOOR as u8 })
            .collect();
        WaveformBars(bars)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_levels(&self) -> Vec<f64> {
        self.0.iter().map(|&b| b as f64).collect()
    }
}

impl TryFrom<Vec<u8>> for WaveformBars {
    type Error = String;

    fn try_from(bars: Vec<u8>) -> Result<Self, Self::Error> {
        match bars.iter().position(|&b| !(FLOOR as u8..=CEIL as u8).contains(&b)) {
            Some(i) => Err(format!("bar {} has level {} outside 10..=100", i, bars[i])),
            None => Ok(WaveformBars(bars)),
        }
    }
}

impl From<WaveformBars> for Vec<u8> {
    fn from(bars: WaveformBars) -> Self {
        bars.0
    }
}

/// Stable identity of a track, used to key fallback output.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetKey {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl AssetKey {
    pub fn new(id: u64, title: Option<&str>) -> Self {
        Self {
            id,
            title: title.map(str::to_owned),
        }
    }

    pub fn seed(&self) -> FallbackSeed {
        FallbackSeed::new(self.id, self.title.as_deref())
    }
}

const SEED_MULTIPLIER: u64 = 12345;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FallbackSeed(u64);

impl FallbackSeed {
    /// `id * 12345` plus the sum of the title's character codes.
    pub fn new(id: u64, title: Option<&str>) -> Self {
        let title_sum = title
            .map(|t| t.chars().map(|c| c as u64).fold(0u64, u64::wrapping_add))
            .unwrap_or(0);
        FallbackSeed(id.wrapping_mul(SEED_MULTIPLIER).wrapping_add(title_sum))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}
