use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::ffmpeg::Ffmpeg;
use crate::error::{Result, WaveformError};

/// Mono samples at the working rate. After [`SampleDecoder::decode`] they are
/// peak-normalized into [-1, 1].
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// One way of turning a file into mono samples at (roughly) `working_rate`.
pub trait DecodeBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn try_decode(&self, path: &Path, working_rate: u32) -> Result<DecodedAudio>;
}

/// Tries each backend in order and peak-normalizes the first success.
pub struct SampleDecoder {
    backends: Vec<Box<dyn DecodeBackend>>,
    working_rate: u32,
}

impl SampleDecoder {
    pub fn new(backends: Vec<Box<dyn DecodeBackend>>, working_rate: u32) -> Self {
        Self {
            backends,
            working_rate,
        }
    }

    /// symphonia first, then ffmpeg as a generic demuxer.
    pub fn with_defaults(ffmpeg: Ffmpeg, working_rate: u32) -> Self {
        Self::new(
            vec![Box::new(SymphoniaBackend), Box::new(FfmpegBackend { ffmpeg })],
            working_rate,
        )
    }

    pub fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        let mut failures = Vec::new();
        for backend in &self.backends {
            match backend.try_decode(path, self.working_rate) {
                Ok(audio) if audio.samples.is_empty() => {
                    log::debug!("{} decoded no samples from {}", backend.name(), path.display());
                    failures.push(format!("{}: no samples", backend.name()));
                }
                Ok(mut audio) => {
                    normalize_peak(&mut audio.samples);
                    log::info!(
                        "Decoded {} with {}: {} samples, {}Hz, {:.1}s",
                        path.display(),
                        backend.name(),
                        audio.samples.len(),
                        audio.sample_rate,
                        audio.duration()
                    );
                    return Ok(audio);
                }
                Err(err) => {
                    log::debug!("{} failed on {}: {}", backend.name(), path.display(), err);
                    failures.push(format!("{}: {}", backend.name(), err));
                }
            }
        }
        Err(WaveformError::decode(path, failures.join("; ")))
    }
}

/// Divide by the peak absolute sample; silence stays silence.
pub fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    let peak = if peak.is_finite() { peak.max(1e-9) } else { 1e-9 };
    for s in samples.iter_mut() {
        *s = if s.is_finite() { (*s / peak).clamp(-1.0, 1.0) } else { 0.0 };
    }
}

pub struct SymphoniaBackend;

impl DecodeBackend for SymphoniaBackend {
    fn name(&self) -> &'static str {
        "symphonia"
    }

    fn try_decode(&self, path: &Path, working_rate: u32) -> Result<DecodedAudio> {
        let mut stream = open_stream(path)?;
        let mut samples: Vec<f32> = Vec::new();

        stream.for_each_buffer(path, |interleaved, channels| {
            // Downmix to mono
            if channels <= 1 {
                samples.extend_from_slice(interleaved);
            } else {
                for frame in interleaved.chunks(channels) {
                    samples.push(frame.iter().sum::<f32>() / channels as f32);
                }
            }
        })?;

        let native_rate = stream.sample_rate;
        if native_rate <= working_rate || samples.is_empty() {
            return Ok(DecodedAudio {
                samples,
                sample_rate: native_rate,
            });
        }

        let resampled = resample_mono(samples, native_rate, working_rate)
            .map_err(|e| WaveformError::decode(path, e))?;
        Ok(DecodedAudio {
            samples: resampled,
            sample_rate: working_rate,
        })
    }
}

pub struct FfmpegBackend {
    pub ffmpeg: Ffmpeg,
}

impl DecodeBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn try_decode(&self, path: &Path, working_rate: u32) -> Result<DecodedAudio> {
        let samples = self.ffmpeg.decode_mono(path, working_rate)?;
        Ok(DecodedAudio {
            samples,
            sample_rate: working_rate,
        })
    }
}

/// Decode the whole stream and count frames; used when nothing cheaper can
/// tell us how long a file is.
pub fn count_duration(path: &Path) -> Result<f64> {
    let mut stream = open_stream(path)?;
    let mut frames: u64 = 0;
    stream.for_each_buffer(path, |interleaved, channels| {
        frames += (interleaved.len() / channels.max(1)) as u64;
    })?;
    if frames == 0 || stream.sample_rate == 0 {
        return Err(WaveformError::decode(path, "stream contains no audio frames"));
    }
    Ok(frames as f64 / stream.sample_rate as f64)
}

struct SymphoniaStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
}

fn open_stream(path: &Path) -> Result<SymphoniaStream> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| WaveformError::decode(path, format!("probe failed: {}", e)))?;

    let format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| WaveformError::decode(path, "no audio tracks found"))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| WaveformError::decode(path, "unknown sample rate"))?;

    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| WaveformError::decode(path, format!("no decoder: {}", e)))?;

    Ok(SymphoniaStream {
        format,
        decoder,
        track_id,
        sample_rate,
    })
}

impl SymphoniaStream {
    /// Feed every decoded packet to `f` as interleaved f32 plus its channel count.
    fn for_each_buffer<F>(&mut self, path: &Path, mut f: F) -> Result<()>
    where
        F: FnMut(&[f32], usize),
    {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(WaveformError::decode(path, e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(WaveformError::decode(path, e)),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count().max(1);
            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            f(sample_buf.samples(), channels);
        }
        Ok(())
    }
}

/// Band-limited downsampling of a mono signal with rubato.
fn resample_mono(samples: Vec<f32>, from_rate: u32, to_rate: u32) -> Result<Vec<f32>, String> {
    let params = SincInterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = to_rate as f64 / from_rate as f64;
    let frames = samples.len();

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, frames, 1)
        .map_err(|e| format!("failed to create resampler: {}", e))?;
    let input = vec![samples];
    let mut output = resampler
        .process(&input, None)
        .map_err(|e| format!("resampling failed: {}", e))?;

    log::debug!(
        "Resampled {} frames ({} Hz) -> {} frames ({} Hz)",
        frames,
        from_rate,
        output.first().map_or(0, Vec::len),
        to_rate
    );
    Ok(output.pop().unwrap_or_default())
}
