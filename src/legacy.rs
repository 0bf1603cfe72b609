//! The capacity-limited store older versions kept book files in, and the
//! one-shot migration that drains it into [`BinaryAssetStore`].
//!
//! The legacy store is a single JSON object keyed by book id. Migration is an
//! explicit call that reports one outcome per entry; an entry that cannot be
//! moved is logged, left in place, and does not stop the batch.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::asset_store::{BinaryAssetStore, FileType};
use crate::error::{AssetError, AssetResult, StoreError, StoreResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyEntry {
    pub file_name: String,
    pub file_type: FileType,
    /// Base64 text, as the old store kept it.
    pub data: String,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct LegacyAssetStore {
    path: PathBuf,
    capacity_bytes: u64,
}

impl LegacyAssetStore {
    pub fn new(path: impl Into<PathBuf>, capacity_bytes: u64) -> Self {
        Self {
            path: path.into(),
            capacity_bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, ordered by book id. A missing file is an empty store.
    pub fn entries(&self) -> StoreResult<BTreeMap<String, LegacyEntry>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read(&self.path)?;
        if raw.is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.entries()?.is_empty())
    }

    /// Write an entry the way the old store did, subject to its capacity.
    pub fn save(
        &self,
        book_id: &str,
        file_name: &str,
        file_type: FileType,
        data: &[u8],
    ) -> AssetResult<()> {
        let mut entries = self.entries()?;
        entries.insert(
            book_id.to_string(),
            LegacyEntry {
                file_name: file_name.to_string(),
                file_type,
                data: BASE64.encode(data),
                stored_at: Utc::now(),
            },
        );
        let serialized = serde_json::to_vec(&entries).map_err(StoreError::from)?;
        if serialized.len() as u64 > self.capacity_bytes {
            return Err(AssetError::StorageQuotaExceeded {
                needed: serialized.len() as u64,
                available: self.capacity_bytes,
            });
        }
        self.write(&serialized)?;
        Ok(())
    }

    pub fn remove(&self, book_id: &str) -> StoreResult<()> {
        self.remove_many(&[book_id])
    }

    /// Drop several entries with a single rewrite of the file.
    pub fn remove_many(&self, book_ids: &[&str]) -> StoreResult<()> {
        let mut entries = self.entries()?;
        let before = entries.len();
        for book_id in book_ids {
            entries.remove(*book_id);
        }
        if entries.len() != before {
            self.write(&serde_json::to_vec(&entries)?)?;
        }
        Ok(())
    }

    fn write(&self, bytes: &[u8]) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, bytes)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Migrated { size_bytes: u64 },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationEntry {
    pub book_id: String,
    pub outcome: MigrationOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub entries: Vec<MigrationEntry>,
}

impl MigrationReport {
    pub fn migrated(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, MigrationOutcome::Migrated { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.entries.len() - self.migrated()
    }
}

/// Move every legacy entry into `store`. Stored entries are removed from the
/// legacy file in one rewrite at the end; failed ones stay behind.
pub fn migrate(
    legacy: &LegacyAssetStore,
    store: &BinaryAssetStore,
) -> StoreResult<MigrationReport> {
    let attempts: Vec<(String, AssetResult<u64>)> = legacy
        .entries()?
        .into_iter()
        .map(|(book_id, entry)| {
            let result = migrate_entry(&book_id, &entry, store);
            (book_id, result)
        })
        .collect();

    let stored: Vec<&str> = attempts
        .iter()
        .filter(|(_, result)| result.is_ok())
        .map(|(book_id, _)| book_id.as_str())
        .collect();
    let removal = legacy.remove_many(&stored);

    let mut report = MigrationReport::default();
    for (book_id, result) in attempts {
        let outcome = match (result, &removal) {
            (Ok(size_bytes), Ok(())) => MigrationOutcome::Migrated { size_bytes },
            (Ok(_), Err(e)) => MigrationOutcome::Skipped {
                reason: format!("stored, but legacy copy not removed: {e}"),
            },
            (Err(e), _) => MigrationOutcome::Skipped {
                reason: e.to_string(),
            },
        };

        if let MigrationOutcome::Skipped { reason } = &outcome {
            warn!(book_id = %book_id, %reason, "legacy asset not migrated");
        }
        report.entries.push(MigrationEntry { book_id, outcome });
    }

    if !report.entries.is_empty() {
        info!(
            migrated = report.migrated(),
            skipped = report.skipped(),
            "legacy migration finished"
        );
    }
    Ok(report)
}

fn migrate_entry(
    book_id: &str,
    entry: &LegacyEntry,
    store: &BinaryAssetStore,
) -> AssetResult<u64> {
    let data = BASE64.decode(&entry.data).map_err(|e| AssetError::Corrupt {
        book_id: book_id.to_string(),
        message: e.to_string(),
    })?;
    let summary = store.save(book_id, &entry.file_name, entry.file_type, &data)?;
    Ok(summary.size_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_store::AssetLimits;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir, max_asset_bytes: u64) -> BinaryAssetStore {
        BinaryAssetStore::open(
            &dir.path().join("assets.redb"),
            AssetLimits {
                max_asset_bytes,
                quota_bytes: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let legacy = LegacyAssetStore::new(dir.path().join("legacy.json"), 1024);
        assert!(legacy.is_empty().unwrap());
    }

    #[test]
    fn legacy_capacity_is_enforced() {
        let dir = TempDir::new().unwrap();
        let legacy = LegacyAssetStore::new(dir.path().join("legacy.json"), 64);
        let err = legacy
            .save("big", "big.epub", FileType::Reflowable, &[0u8; 128])
            .unwrap_err();
        assert!(err.is_capacity());
        assert!(legacy.is_empty().unwrap());
    }

    #[test]
    fn migration_moves_entries_and_drains_legacy() {
        let dir = TempDir::new().unwrap();
        let legacy = LegacyAssetStore::new(dir.path().join("legacy.json"), 1024 * 1024);
        legacy
            .save("b1", "one.epub", FileType::Reflowable, b"first book")
            .unwrap();
        legacy
            .save("b2", "two.pdf", FileType::Paged, b"second book")
            .unwrap();
        let store = store_in(&dir, 1024);

        let report = migrate(&legacy, &store).unwrap();

        assert_eq!(report.migrated(), 2);
        assert_eq!(report.skipped(), 0);
        assert!(legacy.is_empty().unwrap());
        let asset = store.get("b2").unwrap().unwrap();
        assert_eq!(asset.data, b"second book");
        assert_eq!(asset.summary.file_type, FileType::Paged);
    }

    #[test]
    fn failed_entry_is_skipped_and_kept() {
        let dir = TempDir::new().unwrap();
        let legacy = LegacyAssetStore::new(dir.path().join("legacy.json"), 1024 * 1024);
        legacy
            .save("small", "s.epub", FileType::Reflowable, b"tiny")
            .unwrap();
        legacy
            .save("large", "l.epub", FileType::Reflowable, &[9u8; 300])
            .unwrap();
        let store = store_in(&dir, 100);

        let report = migrate(&legacy, &store).unwrap();

        assert_eq!(report.migrated(), 1);
        let skipped = report
            .entries
            .iter()
            .find(|e| e.book_id == "large")
            .unwrap();
        assert!(matches!(skipped.outcome, MigrationOutcome::Skipped { .. }));
        assert!(store.has("small").unwrap());
        assert!(!store.has("large").unwrap());
        assert!(legacy.entries().unwrap().contains_key("large"));
    }

    #[test]
    fn remove_many_keeps_unlisted_entries() {
        let dir = TempDir::new().unwrap();
        let legacy = LegacyAssetStore::new(dir.path().join("legacy.json"), 1024 * 1024);
        for id in ["a", "b", "c"] {
            legacy
                .save(id, "x.epub", FileType::Reflowable, id.as_bytes())
                .unwrap();
        }

        legacy.remove_many(&["a", "c", "missing"]).unwrap();
        let left: Vec<String> = legacy.entries().unwrap().into_keys().collect();
        assert_eq!(left, vec!["b".to_string()]);

        legacy.remove_many(&[]).unwrap();
        legacy.remove("b").unwrap();
        assert!(legacy.is_empty().unwrap());
    }

    #[test]
    fn undecodable_entry_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.json");
        let mut entries = BTreeMap::new();
        entries.insert(
            "bad".to_string(),
            LegacyEntry {
                file_name: "bad.epub".into(),
                file_type: FileType::Reflowable,
                data: "***not base64***".into(),
                stored_at: Utc::now(),
            },
        );
        fs::write(&path, serde_json::to_vec(&entries).unwrap()).unwrap();
        let legacy = LegacyAssetStore::new(path, 1024);
        let store = store_in(&dir, 1024);

        let report = migrate(&legacy, &store).unwrap();

        assert_eq!(report.skipped(), 1);
        assert!(!store.has("bad").unwrap());
    }
}
