mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use barform::batch::{self, BatchOptions, ClaimSet, Outcome};
use barform::config::{self, Config};
use barform::store::{JsonStore, StoredWaveform};
use barform::pipeline::MAX_REQUEST_BARS;
use barform::{AnalysisRequest, AssetKey, AudioReference, Waveform, WaveformAnalyzer};
use cli::{AnalyzeArgs, BarArgs, BatchArgs, Cli, Command, FallbackArgs};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config = match config::find_config(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                if cli.config.is_some() {
                    anyhow::bail!("Failed to load config from {}", path.display());
                }
                log::warn!("Failed to load config from {}; using defaults", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };

    match cli.command {
        Command::Analyze(args) => analyze(&config, args),
        Command::Batch(args) => run_batch(&config, args),
        Command::Fallback(args) => fallback(&config, args),
    }
}

fn bar_count(config: &Config, args: &BarArgs) -> usize {
    if args.light {
        config.analysis.light_bars
    } else {
        args.bars.unwrap_or(config.analysis.bars)
    }
}

fn analyze(config: &Config, args: AnalyzeArgs) -> Result<()> {
    let asset = AssetKey::new(args.id, args.title.as_deref());
    let request = AnalysisRequest::new(
        asset.clone(),
        AudioReference::parse(&args.source),
        bar_count(config, &args.bars),
        args.duration,
    )?;

    log::info!("Analyzing {} (asset {})", request.reference(), asset.id);
    let analyzer = WaveformAnalyzer::from_config(config);
    let waveform = analyzer.analyze(&request);
    log::info!("{} bars ({:?})", waveform.bars.len(), waveform.origin);

    write_artifact(&StoredWaveform::new(&asset, &waveform), args.output.as_deref())
}

fn run_batch(config: &Config, args: BatchArgs) -> Result<()> {
    let assets = batch::load_manifest(&args.manifest)
        .with_context(|| format!("Failed to read manifest {}", args.manifest.display()))?;
    let out_dir = args.out_dir.unwrap_or_else(|| config.output.dir.clone());
    let store = JsonStore::new(&out_dir)
        .with_context(|| format!("Failed to open output dir {}", out_dir.display()))?;

    log::info!("Batch: {} assets -> {}", assets.len(), store.dir().display());

    let options = BatchOptions {
        bars: bar_count(config, &args.bars),
        force: args.force,
    };
    let analyzer = WaveformAnalyzer::from_config(config);

    let pb = ProgressBar::new(assets.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} assets ({eta} remaining)")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let report = batch::run_batch(&analyzer, &store, &assets, options, &ClaimSet::default(), |done| {
        if let Outcome::Errored { message } = &done.outcome {
            pb.println(format!("asset {}: {}", done.id, message));
        }
        pb.inc(1);
    });
    pb.finish_with_message("Batch complete");

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.errored > 0 {
        log::warn!("{} assets failed", report.errored);
    }
    Ok(())
}

fn fallback(config: &Config, args: FallbackArgs) -> Result<()> {
    let asset = AssetKey::new(args.id, args.title.as_deref());
    let bars = bar_count(config, &args.bars);
    if bars == 0 || bars > MAX_REQUEST_BARS {
        anyhow::bail!("Bar count must be between 1 and {}", MAX_REQUEST_BARS);
    }
    let waveform = Waveform::fallback(&asset, bars);
    write_artifact(&StoredWaveform::new(&asset, &waveform), None)
}

fn write_artifact(stored: &StoredWaveform, output: Option<&std::path::Path>) -> Result<()> {
    match output {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let json = serde_json::to_string_pretty(stored)?;
            if let Some(dir) = dir {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(stored)?),
    }
    Ok(())
}

