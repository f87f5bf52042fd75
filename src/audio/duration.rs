use std::path::Path;

use super::decode::count_duration;
use super::ffmpeg::Ffmpeg;
use crate::error::{Result, WaveformError};

pub const DEFAULT_DURATION_SECS: f64 = 180.0;

/// A single strategy for finding out how long a file plays.
pub trait DurationProbe: Send + Sync {
    fn name(&self) -> &'static str;
    fn probe(&self, path: &Path) -> Result<f64>;
}

/// Asks ffprobe for the container duration. Handles every format ffmpeg does.
pub struct FfprobeProbe {
    pub ffmpeg: Ffmpeg,
}

impl DurationProbe for FfprobeProbe {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    fn probe(&self, path: &Path) -> Result<f64> {
        self.ffmpeg.probe_duration(path)
    }
}

/// Reads frames and sample rate straight out of a RIFF/WAVE header.
pub struct WavHeaderProbe;

impl DurationProbe for WavHeaderProbe {
    fn name(&self) -> &'static str {
        "wav-header"
    }

    fn probe(&self, path: &Path) -> Result<f64> {
        let reader = hound::WavReader::open(path).map_err(|e| WaveformError::duration(path, e))?;
        let spec = reader.spec();
        if spec.sample_rate == 0 {
            return Err(WaveformError::duration(path, "zero sample rate in header"));
        }
        // `duration` is in frames, independent of channel count
        let secs = reader.duration() as f64 / spec.sample_rate as f64;
        if secs > 0.0 {
            Ok(secs)
        } else {
            Err(WaveformError::duration(path, "header reports no frames"))
        }
    }
}

/// Decodes the entire stream and divides frames by rate. Slow, but works on
/// anything symphonia can read.
pub struct DecodeProbe;

impl DurationProbe for DecodeProbe {
    fn name(&self) -> &'static str {
        "decode"
    }

    fn probe(&self, path: &Path) -> Result<f64> {
        count_duration(path).map_err(|e| WaveformError::duration(path, e))
    }
}

pub struct DurationResolver {
    probes: Vec<Box<dyn DurationProbe>>,
    default_duration: f64,
}

impl DurationResolver {
    pub fn new(probes: Vec<Box<dyn DurationProbe>>, default_duration: f64) -> Self {
        Self {
            probes,
            default_duration,
        }
    }

    pub fn with_defaults(ffmpeg: Ffmpeg, default_duration: f64) -> Self {
        Self::new(
            vec![
                Box::new(FfprobeProbe { ffmpeg }),
                Box::new(WavHeaderProbe),
                Box::new(DecodeProbe),
            ],
            default_duration,
        )
    }

    /// First strategy to succeed wins.
    pub fn try_resolve(&self, path: &Path) -> Result<f64> {
        let mut failures = Vec::new();
        for probe in &self.probes {
            match probe.probe(path) {
                Ok(secs) if secs.is_finite() && secs > 0.0 => {
                    log::debug!("{}: {:.2}s via {}", path.display(), secs, probe.name());
                    return Ok(secs);
                }
                Ok(secs) => {
                    log::debug!("{} returned unusable duration {} for {}", probe.name(), secs, path.display());
                    failures.push(format!("{}: unusable value {}", probe.name(), secs));
                }
                Err(err) => {
                    log::debug!("{} could not size {}: {}", probe.name(), path.display(), err);
                    failures.push(format!("{}: {}", probe.name(), err));
                }
            }
        }
        Err(WaveformError::duration(path, failures.join("; ")))
    }

    /// Like [`try_resolve`](Self::try_resolve) but never fails; unknown
    /// durations become the configured default.
    pub fn resolve(&self, path: &Path) -> f64 {
        match self.try_resolve(path) {
            Ok(secs) => secs,
            Err(err) => {
                log::warn!("{}; assuming {:.0}s", err, self.default_duration);
                self.default_duration
            }
        }
    }
}
