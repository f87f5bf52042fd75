use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ProbeConfig;
use crate::error::{Result, WaveformError};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Run `program` to completion, killing it once `timeout` has elapsed.
///
/// Both pipes are drained on helper threads so a chatty child can't block on a
/// full pipe while we poll for its exit.
pub fn run_with_timeout<I, S>(program: &str, args: I, timeout: Duration) -> io::Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("{} did not finish within {:.1}s", program, timeout.as_secs_f32()),
            ));
        }
        thread::sleep(POLL_INTERVAL);
    };

    let collect = |handle: Option<thread::JoinHandle<Vec<u8>>>| {
        handle.and_then(|h| h.join().ok()).unwrap_or_default()
    };

    Ok(CommandOutput {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

/// Thin wrapper around the `ffprobe`/`ffmpeg` executables.
#[derive(Clone, Debug)]
pub struct Ffmpeg {
    pub ffprobe: String,
    pub ffmpeg: String,
    pub probe_timeout: Duration,
    pub decode_timeout: Duration,
}

impl Ffmpeg {
    pub fn from_config(cfg: &ProbeConfig) -> Self {
        Self {
            ffprobe: cfg.ffprobe.clone(),
            ffmpeg: cfg.ffmpeg.clone(),
            probe_timeout: Duration::from_secs(cfg.probe_timeout_secs),
            decode_timeout: Duration::from_secs(cfg.decode_timeout_secs),
        }
    }

    /// Container duration in seconds as reported by ffprobe.
    pub fn probe_duration(&self, path: &Path) -> Result<f64> {
        let args: [&OsStr; 7] = [
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-show_entries"),
            OsStr::new("format=duration"),
            OsStr::new("-of"),
            OsStr::new("default=noprint_wrappers=1:nokey=1"),
            path.as_os_str(),
        ];
        let output = run_with_timeout(&self.ffprobe, args, self.probe_timeout)
            .map_err(|e| WaveformError::duration(path, format!("{}: {}", self.ffprobe, e)))?;

        if !output.status.success() {
            return Err(WaveformError::duration(
                path,
                format!(
                    "{} exited with {}: {}",
                    self.ffprobe,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(&stdout).ok_or_else(|| {
            WaveformError::duration(path, format!("unparsable ffprobe output {:?}", stdout.trim()))
        })
    }

    /// Decode any container ffmpeg understands into mono f32 at `sample_rate`.
    pub fn decode_mono(&self, path: &Path, sample_rate: u32) -> Result<Vec<f32>> {
        let rate = sample_rate.to_string();
        let args: [&OsStr; 13] = [
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-i"),
            path.as_os_str(),
            OsStr::new("-f"),
            OsStr::new("f32le"),
            OsStr::new("-ac"),
            OsStr::new("1"),
            OsStr::new("-ar"),
            OsStr::new(&rate),
            OsStr::new("-vn"),
            OsStr::new("-y"),
            OsStr::new("pipe:1"),
        ];
        let output = run_with_timeout(&self.ffmpeg, args, self.decode_timeout)
            .map_err(|e| WaveformError::decode(path, format!("{}: {}", self.ffmpeg, e)))?;

        if !output.status.success() {
            return Err(WaveformError::decode(
                path,
                format!(
                    "{} exited with {}: {}",
                    self.ffmpeg,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        Ok(f32le_to_samples(&output.stdout))
    }
}

fn parse_probe_output(stdout: &str) -> Option<f64> {
    let first = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let secs: f64 = first.parse().ok()?;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

fn f32le_to_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_duration() {
        assert_eq!(parse_probe_output("213.472653\n"), Some(213.472653));
    }

    #[test]
    fn rejects_na_and_garbage() {
        assert_eq!(parse_probe_output("N/A\n"), None);
        assert_eq!(parse_probe_output(""), None);
        assert_eq!(parse_probe_output("0.000000"), None);
        assert_eq!(parse_probe_output("-3.0"), None);
    }

    #[test]
    fn skips_leading_blank_lines() {
        assert_eq!(parse_probe_output("\n  \n12.5\n"), Some(12.5));
    }

    #[test]
    fn converts_little_endian_floats() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-1.0f32).to_le_bytes());
        bytes.push(0xAA); // trailing partial sample is dropped
        assert_eq!(f32le_to_samples(&bytes), vec![0.5, -1.0]);
    }

    #[test]
    fn missing_program_is_an_io_error() {
        let result = run_with_timeout(
            "barform-definitely-not-a-real-binary",
            ["--version"],
            Duration::from_secs(1),
        );
        assert!(result.is_err());
    }

    #[test]
    fn missing_ffprobe_is_a_duration_failure() {
        let tool = Ffmpeg {
            ffprobe: "barform-no-such-ffprobe".into(),
            ffmpeg: "barform-no-such-ffmpeg".into(),
            probe_timeout: Duration::from_secs(1),
            decode_timeout: Duration::from_secs(1),
        };
        let err = tool.probe_duration(Path::new("track.mp3")).unwrap_err();
        assert!(matches!(err, WaveformError::DurationUnavailable { .. }));
        let err = tool.decode_mono(Path::new("track.mp3"), 22050).unwrap_err();
        assert!(matches!(err, WaveformError::Decode { .. }));
    }
}
