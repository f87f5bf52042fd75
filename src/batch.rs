use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WaveformError};
use crate::pipeline::{AnalysisRequest, Origin, WaveformAnalyzer};
use crate::source::AudioReference;
use crate::store::{StoredWaveform, WaveformStore};
use crate::waveform::AssetKey;

/// One line of a batch manifest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    pub source: String,
    #[serde(default)]
    pub duration: Option<f64>,
}

impl AssetRecord {
    pub fn key(&self) -> AssetKey {
        AssetKey::new(self.id, self.title.as_deref())
    }
}

pub fn load_manifest(path: &Path) -> Result<Vec<AssetRecord>> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| WaveformError::InvalidRequest(format!("manifest {}: {}", path.display(), e)))
}

#[derive(Clone, Copy, Debug)]
pub struct BatchOptions {
    pub bars: usize,
    /// Regenerate even when an artifact already exists.
    pub force: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Outcome {
    Generated { origin: Origin },
    Skipped { reason: String },
    Errored { message: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct AssetOutcome {
    pub id: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchReport {
    pub generated: usize,
    pub fallback: usize,
    pub skipped: usize,
    pub errored: usize,
    pub assets: Vec<AssetOutcome>,
}

impl BatchReport {
    fn from_outcomes(assets: Vec<AssetOutcome>) -> Self {
        let mut report = BatchReport::default();
        for asset in &assets {
            match &asset.outcome {
                Outcome::Generated { origin } => {
                    report.generated += 1;
                    if *origin == Origin::Fallback {
                        report.fallback += 1;
                    }
                }
                Outcome::Skipped { .. } => report.skipped += 1,
                Outcome::Errored { .. } => report.errored += 1,
            }
        }
        report.assets = assets;
        report
    }
}

/// Asset ids currently being generated in this process.
#[derive(Default)]
pub struct ClaimSet {
    in_flight: Mutex<HashSet<u64>>,
}

impl ClaimSet {
    /// `None` if another worker already holds `id`.
    pub fn claim(&self, id: u64) -> Option<Claim<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.insert(id).then(|| Claim { set: self, id })
    }
}

pub struct Claim<'a> {
    set: &'a ClaimSet,
    id: u64,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let mut set = self.set.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.id);
    }
}

/// Analyze every asset, recording a per-asset outcome. Failures never stop
/// the batch. `on_done` is called once per asset, from worker threads.
pub fn run_batch<S, F>(
    analyzer: &WaveformAnalyzer,
    store: &S,
    assets: &[AssetRecord],
    options: BatchOptions,
    claims: &ClaimSet,
    on_done: F,
) -> BatchReport
where
    S: WaveformStore + ?Sized,
    F: Fn(&AssetOutcome) + Sync,
{
    let outcomes: Vec<AssetOutcome> = assets
        .par_iter()
        .map(|record| {
            let outcome = process_one(analyzer, store, record, options, claims);
            let done = AssetOutcome {
                id: record.id,
                outcome,
            };
            on_done(&done);
            done
        })
        .collect();

    let report = BatchReport::from_outcomes(outcomes);
    log::info!(
        "Batch finished: {} generated ({} fallback), {} skipped, {} errored",
        report.generated,
        report.fallback,
        report.skipped,
        report.errored
    );
    report
}

fn process_one<S: WaveformStore + ?Sized>(
    analyzer: &WaveformAnalyzer,
    store: &S,
    record: &AssetRecord,
    options: BatchOptions,
    claims: &ClaimSet,
) -> Outcome {
    let Some(_claim) = claims.claim(record.id) else {
        log::debug!("Asset {} already in flight; skipping", record.id);
        return Outcome::Skipped {
            reason: "already in progress".into(),
        };
    };

    if !options.force {
        match store.exists(record.id) {
            Ok(true) => {
                return Outcome::Skipped {
                    reason: "already generated".into(),
                }
            }
            Ok(false) => {}
            Err(err) => {
                log::warn!("Asset {}: could not check store: {}", record.id, err);
            }
        }
    }

    let key = record.key();
    let request = match AnalysisRequest::new(
        key.clone(),
        AudioReference::parse(&record.source),
        options.bars,
        record.duration,
    ) {
        Ok(r) => r,
        Err(err) => {
            return Outcome::Errored {
                message: err.to_string(),
            }
        }
    };

    let waveform = analyzer.analyze(&request);
    match store.save(&StoredWaveform::new(&key, &waveform)) {
        Ok(()) => Outcome::Generated {
            origin: waveform.origin,
        },
        Err(err) => {
            log::warn!("Asset {}: failed to store waveform: {}", record.id, err);
            Outcome::Errored {
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::JsonStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(id: u64, source: &str) -> AssetRecord {
        AssetRecord {
            id,
            title: Some(format!("track {}", id)),
            source: source.to_string(),
            duration: Some(120.0),
        }
    }

    struct ReadOnlyStore;
    impl WaveformStore for ReadOnlyStore {
        fn load(&self, _: u64) -> Result<Option<StoredWaveform>> {
            Ok(None)
        }
        fn save(&self, _: &StoredWaveform) -> Result<()> {
            Err(WaveformError::Store("read-only".into()))
        }
    }

    fn options(force: bool) -> BatchOptions {
        BatchOptions { bars: 60, force }
    }

    #[test]
    fn failures_do_not_abort_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();
        let analyzer = WaveformAnalyzer::from_config(&Config::default());
        let assets = vec![
            record(1, "/missing/one.mp3"),
            record(2, "/missing/two.mp3"),
            record(3, "/missing/three.mp3"),
        ];
        let calls = AtomicUsize::new(0);

        let report = run_batch(&analyzer, &store, &assets, options(false), &ClaimSet::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.generated, 3);
        assert_eq!(report.fallback, 3);
        assert_eq!(report.errored, 0);
        for id in 1..=3 {
            let stored = store.load(id).unwrap().unwrap();
            assert_eq!(stored.bar_count, 60);
            assert_eq!(stored.origin, Origin::Fallback);
        }
    }

    #[test]
    fn existing_artifacts_are_skipped_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();
        let analyzer = WaveformAnalyzer::from_config(&Config::default());
        let assets = vec![record(9, "/missing/nine.mp3")];
        let claims = ClaimSet::default();

        let first = run_batch(&analyzer, &store, &assets, options(false), &claims, |_| {});
        assert_eq!(first.generated, 1);

        let second = run_batch(&analyzer, &store, &assets, options(false), &claims, |_| {});
        assert_eq!(second.skipped, 1);
        assert_eq!(second.generated, 0);

        let forced = run_batch(&analyzer, &store, &assets, options(true), &claims, |_| {});
        assert_eq!(forced.generated, 1);
    }

    #[test]
    fn outdated_artifacts_are_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();
        let analyzer = WaveformAnalyzer::from_config(&Config::default());
        let assets = vec![record(4, "/missing/four.mp3")];

        let mut old = serde_json::to_value(StoredWaveform::new(
            &assets[0].key(),
            &crate::pipeline::Waveform::fallback(&assets[0].key(), 60),
        ))
        .unwrap();
        old["format_version"] = serde_json::json!(0);
        std::fs::write(store.path_for(4), old.to_string()).unwrap();

        let report = run_batch(&analyzer, &store, &assets, options(false), &ClaimSet::default(), |_| {});
        assert_eq!(report.skipped, 0);
        assert_eq!(report.generated, 1);
        let stored = store.load(4).unwrap().unwrap();
        assert_eq!(stored.format_version, crate::store::FORMAT_VERSION);
    }

    #[test]
    fn store_errors_are_recorded_per_asset() {
        let analyzer = WaveformAnalyzer::from_config(&Config::default());
        let assets = vec![record(1, "/missing/a.mp3"), record(2, "/missing/b.mp3")];
        let report = run_batch(&analyzer, &ReadOnlyStore, &assets, options(false), &ClaimSet::default(), |_| {});
        assert_eq!(report.errored, 2);
        assert!(report
            .assets
            .iter()
            .all(|a| matches!(&a.outcome, Outcome::Errored { message } if message.contains("read-only"))));
    }

    #[test]
    fn zero_bars_is_an_error_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();
        let analyzer = WaveformAnalyzer::from_config(&Config::default());
        let report = run_batch(
            &analyzer,
            &store,
            &[record(1, "/missing/a.mp3")],
            BatchOptions { bars: 0, force: false },
            &ClaimSet::default(),
            |_| {},
        );
        assert_eq!(report.errored, 1);
    }

    #[test]
    fn claims_are_exclusive_until_dropped() {
        let claims = ClaimSet::default();
        let first = claims.claim(5);
        assert!(first.is_some());
        assert!(claims.claim(5).is_none());
        assert!(claims.claim(6).is_some());
        drop(first);
        assert!(claims.claim(5).is_some());
    }

    #[test]
    fn in_flight_assets_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();
        let analyzer = WaveformAnalyzer::from_config(&Config::default());
        let claims = ClaimSet::default();
        let _held = claims.claim(1).unwrap();

        let report = run_batch(&analyzer, &store, &[record(1, "/missing/a.mp3")], options(true), &claims, |_| {});
        assert_eq!(report.skipped, 1);
        assert!(!store.exists(1).unwrap());
    }

    #[test]
    fn manifest_parses_optional_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"[{"id": 1, "source": "/media/a.mp3"},
                {"id": 2, "title": "Sonne", "source": "https://example.com/b.mp3", "duration": 210.5}]"#,
        )
        .unwrap();
        let records = load_manifest(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, None);
        assert_eq!(records[1].key(), AssetKey::new(2, Some("Sonne")));
        assert_eq!(records[1].duration, Some(210.5));
    }
}
