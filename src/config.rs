use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::layout::Viewport;

pub const CONFIG_FILE_NAME: &str = "folio.toml";

/// Runtime configuration, read from `folio.toml`.
///
/// Every field has a default, so an empty or missing file is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FolioConfig {
    /// Directory holding the asset and reader databases.
    pub data_dir: PathBuf,
    /// Ceiling on a stored payload, measured after text encoding.
    pub max_asset_bytes: u64,
    /// Total capacity of the asset table. `None` means bounded only by disk.
    pub storage_quota_bytes: Option<u64>,
    /// Capacity of the legacy store that `migrate` drains.
    pub legacy_capacity_bytes: u64,
    /// Quiet period before a reading position is written.
    pub debounce_ms: u64,
    /// Anchor count of the reflowable location index.
    pub location_samples: usize,
    /// Minimum horizontal travel for a swipe to turn the page.
    pub swipe_threshold_px: f32,
    pub viewport: ViewportConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub columns: usize,
    pub lines: usize,
}

impl Default for FolioConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".folio"),
            max_asset_bytes: 100 * 1024 * 1024,
            storage_quota_bytes: None,
            legacy_capacity_bytes: 5 * 1024 * 1024,
            debounce_ms: 500,
            location_samples: 1024,
            swipe_threshold_px: 50.0,
            viewport: ViewportConfig::default(),
        }
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            columns: 72,
            lines: 24,
        }
    }
}

impl FolioConfig {
    /// Load from an explicit file, or from `folio.toml` inside `data_dir`
    /// when it exists, or fall back to defaults.
    pub fn load(explicit: Option<&Path>, data_dir: Option<&Path>) -> Result<Self> {
        let candidate = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let dir = data_dir
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| Self::default().data_dir);
                let path = dir.join(CONFIG_FILE_NAME);
                path.exists().then_some(path)
            }
        };

        let mut config = match candidate {
            Some(path) => {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("Failed to parse config: {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Some(dir) = data_dir {
            config.data_dir = dir.to_path_buf();
        }
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.viewport.columns, self.viewport.lines)
    }

    pub fn assets_db_path(&self) -> PathBuf {
        self.data_dir.join("assets.redb")
    }

    pub fn reader_db_path(&self) -> PathBuf {
        self.data_dir.join("reader.redb")
    }

    pub fn legacy_store_path(&self) -> PathBuf {
        self.data_dir.join("legacy-assets.json")
    }
}
