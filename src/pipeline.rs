use serde::{Deserialize, Serialize};

use crate::audio::decode::SampleDecoder;
use crate::audio::duration::DurationResolver;
use crate::audio::ffmpeg::Ffmpeg;
use crate::config::Config;
use crate::error::{Result, WaveformError};
use crate::source::{AudioReference, SourceLocator};
use crate::waveform::bars::{adapt_bar_count, aggregate};
use crate::waveform::smooth::{resample, smooth};
use crate::waveform::{fallback, AssetKey, WaveformBars};

/// Largest bar count a request may ask for.
pub const MAX_REQUEST_BARS: usize = 10_000;

#[derive(Clone, Debug)]
pub struct AnalysisRequest {
    asset: AssetKey,
    reference: AudioReference,
    bars: usize,
    duration: Option<f64>,
}

impl AnalysisRequest {
    /// Fails when `bars` is zero or above [`MAX_REQUEST_BARS`]. Unusable
    /// duration hints are dropped.
    pub fn new(
        asset: AssetKey,
        reference: AudioReference,
        bars: usize,
        duration: Option<f64>,
    ) -> Result<Self> {
        if bars == 0 {
            return Err(WaveformError::InvalidRequest(format!(
                "asset {}: bar count must be positive",
                asset.id
            )));
        }
        if bars > MAX_REQUEST_BARS {
            return Err(WaveformError::InvalidRequest(format!(
                "asset {}: bar count {} exceeds {}",
                asset.id, bars, MAX_REQUEST_BARS
            )));
        }
        let duration = duration.filter(|d| d.is_finite() && *d > 0.0);
        Ok(Self {
            asset,
            reference,
            bars,
            duration,
        })
    }

    pub fn asset(&self) -> &AssetKey {
        &self.asset
    }

    pub fn reference(&self) -> &AudioReference {
        &self.reference
    }

    pub fn bars(&self) -> usize {
        self.bars
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Analyzed,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Waveform {
    pub bars: WaveformBars,
    pub origin: Origin,
}

impl Waveform {
    pub fn fallback(asset: &AssetKey, num_bars: usize) -> Self {
        Waveform {
            bars: fallback::waveform(asset, num_bars),
            origin: Origin::Fallback,
        }
    }

    /// Change the bar count after the fact.
    pub fn resampled(&self, new_len: usize, asset: &AssetKey) -> Waveform {
        let origin = if self.bars.is_empty() {
            Origin::Fallback
        } else {
            self.origin
        };
        Waveform {
            bars: WaveformBars::from_levels(&resample(&self.bars.to_levels(), new_len, asset)),
            origin,
        }
    }
}

/// Locate → size → decode → aggregate → smooth, with a deterministic
/// fallback whenever any of it goes wrong.
pub struct WaveformAnalyzer {
    locator: SourceLocator,
    durations: DurationResolver,
    decoder: SampleDecoder,
}

impl WaveformAnalyzer {
    pub fn new(locator: SourceLocator, durations: DurationResolver, decoder: SampleDecoder) -> Self {
        Self {
            locator,
            durations,
            decoder,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let ffmpeg = Ffmpeg::from_config(&cfg.probe);
        Self::new(
            SourceLocator::from_config(&cfg.source),
            DurationResolver::with_defaults(ffmpeg.clone(), cfg.analysis.default_duration),
            SampleDecoder::with_defaults(ffmpeg, cfg.working_sample_rate()),
        )
    }

    /// Never fails: stage errors are logged and replaced by the asset's
    /// fallback waveform.
    pub fn analyze(&self, request: &AnalysisRequest) -> Waveform {
        let mut num_bars = adapt_bar_count(request.bars, request.duration);
        match self.run(request, &mut num_bars) {
            Ok(levels) => Waveform {
                bars: WaveformBars::from_levels(&smooth(&levels)),
                origin: Origin::Analyzed,
            },
            Err(err) => {
                log::warn!(
                    "Asset {} ({}): analysis failed, using fallback: {}",
                    request.asset.id,
                    request.reference,
                    err
                );
                Waveform::fallback(&request.asset, num_bars)
            }
        }
    }

    fn run(&self, request: &AnalysisRequest, num_bars: &mut usize) -> Result<Vec<f64>> {
        // Held until the end of this function so temp files outlive decoding.
        let source = self.locator.locate(&request.reference)?;
        let path = source.path();

        let duration = match request.duration {
            Some(hint) => hint,
            None => self.durations.resolve(path),
        };
        *num_bars = adapt_bar_count(request.bars, Some(duration));

        let audio = self.decoder.decode(path)?;
        log::debug!(
            "Asset {}: {} bars from {:.1}s of audio",
            request.asset.id,
            num_bars,
            audio.duration()
        );
        Ok(aggregate(&audio, *num_bars, &mut rand::rng()))
    }
}
