//! Global reading preferences and per-book reading positions, persisted in redb.
//!
//! Keys are stable: settings live under `"global"` in `reader_settings`,
//! positions under `"{book_id}:{file_type}"` in `reading_positions`.

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::asset_store::FileType;
use crate::config::FolioConfig;
use crate::error::{StoreError, StoreResult};

const READER_SETTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("reader_settings");
const READING_POSITIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("reading_positions");

const SETTINGS_KEY: &str = "global";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Sepia,
}

impl Theme {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::Sepia => "sepia",
        }
    }

    pub const fn cycle(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Sepia,
            Self::Sepia => Self::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Font size in percent of normal: 80 to 150 in steps of 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct FontSize(u8);

impl FontSize {
    pub const MIN: u8 = 80;
    pub const MAX: u8 = 150;
    pub const STEP: u8 = 10;

    /// Clamp to the supported range and snap to the nearest step.
    pub fn new(percent: u8) -> Self {
        let clamped = percent.clamp(Self::MIN, Self::MAX);
        let steps = (clamped - Self::MIN + Self::STEP / 2) / Self::STEP;
        Self(Self::MIN + steps * Self::STEP)
    }

    pub fn percent(self) -> u8 {
        self.0
    }

    pub fn increase(self) -> Self {
        Self::new(self.0.saturating_add(Self::STEP))
    }

    pub fn decrease(self) -> Self {
        Self::new(self.0.saturating_sub(Self::STEP))
    }
}

impl Default for FontSize {
    fn default() -> Self {
        Self(100)
    }
}

impl From<u8> for FontSize {
    fn from(percent: u8) -> Self {
        Self::new(percent)
    }
}

impl From<FontSize> for u8 {
    fn from(size: FontSize) -> Self {
        size.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    pub font_size: FontSize,
    pub theme: Theme,
    pub font_family: String,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            font_size: FontSize::default(),
            theme: Theme::default(),
            font_family: "serif".to_string(),
        }
    }
}

/// Last known place in a book. The percentage is a cache of what the
/// document computes for the token; readers recompute it on restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingPosition {
    pub book_id: String,
    pub file_type: FileType,
    pub location_token: String,
    pub percentage: u8,
}

pub fn position_key(book_id: &str, file_type: FileType) -> String {
    format!("{book_id}:{file_type}")
}

pub struct ReaderSettingsStore {
    db: Database,
}

impl ReaderSettingsStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path).map_err(StoreError::redb("open reader database"))?;

        let txn = db.begin_write().map_err(StoreError::redb("begin_write"))?;
        {
            txn.open_table(READER_SETTINGS)
                .map_err(StoreError::redb("open reader_settings"))?;
            txn.open_table(READING_POSITIONS)
                .map_err(StoreError::redb("open reading_positions"))?;
        }
        txn.commit().map_err(StoreError::redb("commit"))?;
        Ok(Self { db })
    }

    pub fn from_config(config: &FolioConfig) -> StoreResult<Self> {
        Self::open(&config.reader_db_path())
    }

    /// Current settings. The first call stores and returns the defaults.
    pub fn load_settings(&self) -> StoreResult<ReaderSettings> {
        match self.get(READER_SETTINGS, SETTINGS_KEY)? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => {
                let settings = ReaderSettings::default();
                self.save_settings(&settings)?;
                Ok(settings)
            }
        }
    }

    pub fn save_settings(&self, settings: &ReaderSettings) -> StoreResult<()> {
        self.put(READER_SETTINGS, SETTINGS_KEY, &serde_json::to_vec(settings)?)?;
        debug!(theme = %settings.theme, font_size = settings.font_size.percent(), "settings saved");
        Ok(())
    }

    pub fn load_position(
        &self,
        book_id: &str,
        file_type: FileType,
    ) -> StoreResult<Option<ReadingPosition>> {
        let key = position_key(book_id, file_type);
        match self.get(READING_POSITIONS, &key)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn save_position(&self, position: &ReadingPosition) -> StoreResult<()> {
        let key = position_key(&position.book_id, position.file_type);
        self.put(READING_POSITIONS, &key, &serde_json::to_vec(position)?)
    }

    /// Forget every position recorded for `book_id`.
    pub fn clear_positions(&self, book_id: &str) -> StoreResult<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(StoreError::redb("begin_write"))?;
        {
            let mut table = txn
                .open_table(READING_POSITIONS)
                .map_err(StoreError::redb("open reading_positions"))?;
            for file_type in [FileType::Reflowable, FileType::Paged] {
                table
                    .remove(position_key(book_id, file_type).as_str())
                    .map_err(StoreError::redb("remove reading_positions"))?;
            }
        }
        txn.commit().map_err(StoreError::redb("commit"))?;
        Ok(())
    }

    fn get(
        &self,
        definition: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> StoreResult<Option<Vec<u8>>> {
        let txn = self
            .db
            .begin_read()
            .map_err(StoreError::redb("begin_read"))?;
        let table = txn
            .open_table(definition)
            .map_err(StoreError::redb("open_table"))?;
        let value = table.get(key).map_err(StoreError::redb("get"))?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    fn put(
        &self,
        definition: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
        value: &[u8],
    ) -> StoreResult<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(StoreError::redb("begin_write"))?;
        {
            let mut table = txn
                .open_table(definition)
                .map_err(StoreError::redb("open_table"))?;
            table
                .insert(key, value)
                .map_err(StoreError::redb("insert"))?;
        }
        txn.commit().map_err(StoreError::redb("commit"))?;
        Ok(())
    }
}

impl fmt::Debug for ReaderSettingsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderSettingsStore").finish()
    }
}
