use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WaveformError};
use crate::pipeline::{Origin, Waveform};
use crate::waveform::{AssetKey, WaveformBars};

pub const FORMAT_VERSION: u32 = 1;

/// Standalone artifact for one asset's bars.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredWaveform {
    pub asset_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub bars: WaveformBars,
    pub bar_count: usize,
    pub generated_at: DateTime<Utc>,
    pub generated: bool,
    pub origin: Origin,
    pub format_version: u32,
}

impl StoredWaveform {
    pub fn new(asset: &AssetKey, waveform: &Waveform) -> Self {
        Self {
            asset_id: asset.id,
            title: asset.title.clone(),
            bar_count: waveform.bars.len(),
            bars: waveform.bars.clone(),
            generated_at: Utc::now(),
            generated: true,
            origin: waveform.origin,
            format_version: FORMAT_VERSION,
        }
    }
}

/// Persistence seam for finished waveforms.
pub trait WaveformStore: Send + Sync {
    fn load(&self, asset_id: u64) -> Result<Option<StoredWaveform>>;
    fn save(&self, stored: &StoredWaveform) -> Result<()>;

    fn exists(&self, asset_id: u64) -> Result<bool> {
        Ok(self.load(asset_id)?.is_some())
    }
}

/// One `<asset_id>.json` file per asset in a directory.
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, asset_id: u64) -> PathBuf {
        self.dir.join(format!("{}.json", asset_id))
    }
}

impl WaveformStore for JsonStore {
    fn load(&self, asset_id: u64) -> Result<Option<StoredWaveform>> {
        let path = self.path_for(asset_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredWaveform = serde_json::from_str(&content)
            .map_err(|e| WaveformError::Store(format!("{}: {}", path.display(), e)))?;
        if stored.format_version != FORMAT_VERSION {
            log::warn!(
                "Ignoring {}: format version {} (expected {})",
                path.display(),
                stored.format_version,
                FORMAT_VERSION
            );
            return Ok(None);
        }
        Ok(Some(stored))
    }

    /// Written to a sibling temp file first, then renamed into place.
    fn save(&self, stored: &StoredWaveform) -> Result<()> {
        let json = serde_json::to_string_pretty(stored)
            .map_err(|e| WaveformError::Store(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        std::io::Write::write_all(&mut tmp, json.as_bytes())?;
        let target = self.path_for(stored.asset_id);
        tmp.persist(&target)
            .map_err(|e| WaveformError::Store(format!("{}: {}", target.display(), e)))?;
        log::debug!("Saved waveform for asset {} to {}", stored.asset_id, target.display());
        Ok(())
    }
}
