use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_bars")]
    pub bars: usize,
    /// Bar count for the lighter-weight variant (`--light`).
    #[serde(default = "default_light_bars")]
    pub light_bars: usize,
    #[serde(default = "default_working_sample_rate")]
    pub working_sample_rate: u32,
    /// Seconds assumed when no probing strategy can determine a duration.
    #[serde(default = "default_duration")]
    pub default_duration: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SourceConfig {
    /// Directories a web-relative path is resolved against, in priority order.
    #[serde(default = "default_storage_roots")]
    pub storage_roots: Vec<PathBuf>,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_max_fetch_bytes")]
    pub max_fetch_bytes: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_decode_timeout_secs")]
    pub decode_timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bars: default_bars(),
            light_bars: default_light_bars(),
            working_sample_rate: default_working_sample_rate(),
            default_duration: default_duration(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            storage_roots: default_storage_roots(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_fetch_bytes: default_max_fetch_bytes(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ffprobe: default_ffprobe(),
            ffmpeg: default_ffmpeg(),
            probe_timeout_secs: default_probe_timeout_secs(),
            decode_timeout_secs: default_decode_timeout_secs(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_bars() -> usize { 120 }
fn default_light_bars() -> usize { 60 }
fn default_working_sample_rate() -> u32 { 22050 }
fn default_duration() -> f64 { 180.0 }
fn default_storage_roots() -> Vec<PathBuf> {
    vec![
        PathBuf::from("media"),
        PathBuf::from("static"),
        PathBuf::from("uploads"),
        PathBuf::from("public"),
    ]
}
fn default_fetch_timeout_secs() -> u64 { 30 }
fn default_max_fetch_bytes() -> usize { 10 * 1024 * 1024 }
fn default_chunk_size() -> usize { 8 * 1024 }
fn default_ffprobe() -> String { "ffprobe".into() }
fn default_ffmpeg() -> String { "ffmpeg".into() }
fn default_probe_timeout_secs() -> u64 { 10 }
fn default_decode_timeout_secs() -> u64 { 120 }
fn default_output_dir() -> PathBuf { PathBuf::from("waveforms") }

impl Config {
    /// Working sample rate clamped to a range where RMS bars stay meaningful.
    pub fn working_sample_rate(&self) -> u32 {
        self.analysis.working_sample_rate.clamp(8000, 48000)
    }
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}

/// Explicit path, else `barform.toml` in the working directory, else the
/// per-user config locations.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("barform.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("barform").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("barform").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
