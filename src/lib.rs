//! Waveform bars for audio tracks.
//!
//! [`pipeline::WaveformAnalyzer`] turns an [`source::AudioReference`] into a
//! fixed-length [`waveform::WaveformBars`], falling back to a deterministic
//! synthetic waveform whenever the audio can't be found or decoded.

pub mod audio;
pub mod batch;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod store;
pub mod waveform;

pub use error::{Result, WaveformError};
pub use pipeline::{AnalysisRequest, Origin, Waveform, WaveformAnalyzer};
pub use source::AudioReference;
pub use waveform::{AssetKey, WaveformBars};
