use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "barform", about = "Waveform bar extraction for audio tracks")]
pub struct Cli {
    /// Config file (defaults to ./barform.toml or the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze a single file, web path or URL
    Analyze(AnalyzeArgs),
    /// Analyze every asset in a JSON manifest
    Batch(BatchArgs),
    /// Print the synthetic waveform for an asset
    Fallback(FallbackArgs),
}

#[derive(Args, Debug)]
pub struct BarArgs {
    /// Number of bars (before duration adaptation)
    #[arg(short, long)]
    pub bars: Option<usize>,

    /// Use the lighter bar count from config
    #[arg(long, conflicts_with = "bars")]
    pub light: bool,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Audio file path, web-relative path (/media/...) or http(s) URL
    pub source: String,

    /// Asset identity, used to seed the fallback waveform
    #[arg(long, default_value_t = 0)]
    pub id: u64,

    /// Asset title, also part of the fallback seed
    #[arg(long)]
    pub title: Option<String>,

    /// Known duration in seconds; skips probing
    #[arg(long)]
    pub duration: Option<f64>,

    #[command(flatten)]
    pub bars: BarArgs,

    /// Write the artifact JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// JSON array of {id, title?, source, duration?}
    pub manifest: PathBuf,

    /// Artifact directory (defaults to [output].dir)
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,

    /// Regenerate assets that already have an artifact
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub bars: BarArgs,
}

#[derive(Args, Debug)]
pub struct FallbackArgs {
    #[arg(long)]
    pub id: u64,

    #[arg(long)]
    pub title: Option<String>,

    #[command(flatten)]
    pub bars: BarArgs,
}
