//! Durable blob store for book files, keyed by book identifier.
//!
//! Payloads are kept as base64 text in one redb table and their metadata in
//! another, so listing and usage accounting never touch the payload rows.
//! Both rows of an asset are written in a single transaction.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::FolioConfig;
use crate::error::{AssetError, AssetResult, StoreError, StoreResult};

/// Book id → JSON-encoded [`AssetSummary`].
const ASSET_META: TableDefinition<&str, &[u8]> = TableDefinition::new("asset_meta");

/// Book id → base64 payload.
const ASSET_DATA: TableDefinition<&str, &str> = TableDefinition::new("asset_data");

/// Declared format of a stored book. Chosen by the caller, never sniffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// EPUB: reflowable text addressed by location tokens.
    Reflowable,
    /// PDF: fixed pages addressed by page number.
    Paged,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Reflowable => "reflowable",
            FileType::Paged => "paged",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asset metadata without the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSummary {
    pub book_id: String,
    pub file_name: String,
    pub file_type: FileType,
    pub size_bytes: u64,
    pub stored_at: DateTime<Utc>,
}

/// A stored book file with its decoded payload.
#[derive(Debug, Clone)]
pub struct StoredAsset {
    pub summary: AssetSummary,
    pub data: Vec<u8>,
}

/// Size limits applied on save.
#[derive(Debug, Clone, Copy)]
pub struct AssetLimits {
    pub max_asset_bytes: u64,
    pub quota_bytes: Option<u64>,
}

impl From<&FolioConfig> for AssetLimits {
    fn from(config: &FolioConfig) -> Self {
        Self {
            max_asset_bytes: config.max_asset_bytes,
            quota_bytes: config.storage_quota_bytes,
        }
    }
}

pub struct BinaryAssetStore {
    db: Database,
    limits: AssetLimits,
}

impl BinaryAssetStore {
    /// Open or create the asset database at `path`.
    pub fn open(path: &Path, limits: AssetLimits) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path).map_err(StoreError::redb("open asset database"))?;

        // Read transactions fail on missing tables, so create both up front.
        let txn = db.begin_write().map_err(StoreError::redb("begin_write"))?;
        {
            txn.open_table(ASSET_META)
                .map_err(StoreError::redb("open asset_meta"))?;
            txn.open_table(ASSET_DATA)
                .map_err(StoreError::redb("open asset_data"))?;
        }
        txn.commit().map_err(StoreError::redb("commit"))?;

        debug!(path = %path.display(), "asset store opened");
        Ok(Self { db, limits })
    }

    pub fn from_config(config: &FolioConfig) -> StoreResult<Self> {
        Self::open(&config.assets_db_path(), AssetLimits::from(config))
    }

    pub fn limits(&self) -> AssetLimits {
        self.limits
    }

    /// Store `data` for `book_id`, replacing any previous asset of that book.
    ///
    /// Nothing is written when the payload is over the size ceiling or the
    /// quota cannot absorb it.
    pub fn save(
        &self,
        book_id: &str,
        file_name: &str,
        file_type: FileType,
        data: &[u8],
    ) -> AssetResult<AssetSummary> {
        let encoded = BASE64.encode(data);
        let encoded_len = encoded.len() as u64;
        if encoded_len > self.limits.max_asset_bytes {
            warn!(book_id, size = encoded_len, "asset rejected: over size ceiling");
            return Err(AssetError::AssetTooLarge {
                size: encoded_len,
                max: self.limits.max_asset_bytes,
            });
        }

        let summary = AssetSummary {
            book_id: book_id.to_string(),
            file_name: file_name.to_string(),
            file_type,
            size_bytes: data.len() as u64,
            stored_at: Utc::now(),
        };
        let meta = serde_json::to_vec(&summary).map_err(StoreError::from)?;

        let txn = self
            .db
            .begin_write()
            .map_err(StoreError::redb("begin_write"))?;
        let rejected = {
            let mut meta_table = txn
                .open_table(ASSET_META)
                .map_err(StoreError::redb("open asset_meta"))?;

            match self.check_quota(&meta_table, book_id, summary.size_bytes)? {
                Some(err) => Some(err),
                None => {
                    meta_table
                        .insert(book_id, meta.as_slice())
                        .map_err(StoreError::redb("insert asset_meta"))?;
                    let mut data_table = txn
                        .open_table(ASSET_DATA)
                        .map_err(StoreError::redb("open asset_data"))?;
                    data_table
                        .insert(book_id, encoded.as_str())
                        .map_err(StoreError::redb("insert asset_data"))?;
                    None
                }
            }
        };

        if let Some(err) = rejected {
            txn.abort().map_err(StoreError::redb("abort"))?;
            warn!(book_id, "asset rejected: {err}");
            return Err(err);
        }
        txn.commit().map_err(StoreError::redb("commit"))?;

        info!(book_id, file_type = %file_type, size = summary.size_bytes, "asset stored");
        Ok(summary)
    }

    fn check_quota(
        &self,
        meta_table: &impl ReadableTable<&'static str, &'static [u8]>,
        book_id: &str,
        size: u64,
    ) -> AssetResult<Option<AssetError>> {
        let Some(quota) = self.limits.quota_bytes else {
            return Ok(None);
        };
        let used: u64 = read_summaries(meta_table)?
            .iter()
            .filter(|s| s.book_id != book_id)
            .map(|s| s.size_bytes)
            .sum();
        let available = quota.saturating_sub(used);
        if size > available {
            return Ok(Some(AssetError::StorageQuotaExceeded {
                needed: size,
                available,
            }));
        }
        Ok(None)
    }

    /// Fetch and decode the asset of `book_id`.
    pub fn get(&self, book_id: &str) -> AssetResult<Option<StoredAsset>> {
        let txn = self
            .db
            .begin_read()
            .map_err(StoreError::redb("begin_read"))?;
        let meta_table = txn
            .open_table(ASSET_META)
            .map_err(StoreError::redb("open asset_meta"))?;
        let Some(meta) = meta_table
            .get(book_id)
            .map_err(StoreError::redb("get asset_meta"))?
        else {
            return Ok(None);
        };
        let summary: AssetSummary =
            serde_json::from_slice(meta.value()).map_err(StoreError::from)?;

        let data_table = txn
            .open_table(ASSET_DATA)
            .map_err(StoreError::redb("open asset_data"))?;
        let encoded = data_table
            .get(book_id)
            .map_err(StoreError::redb("get asset_data"))?
            .ok_or_else(|| AssetError::Corrupt {
                book_id: book_id.to_string(),
                message: "payload row is missing".to_string(),
            })?;
        let data = BASE64
            .decode(encoded.value())
            .map_err(|e| AssetError::Corrupt {
                book_id: book_id.to_string(),
                message: e.to_string(),
            })?;

        Ok(Some(StoredAsset { summary, data }))
    }

    pub fn has(&self, book_id: &str) -> StoreResult<bool> {
        let txn = self
            .db
            .begin_read()
            .map_err(StoreError::redb("begin_read"))?;
        let meta_table = txn
            .open_table(ASSET_META)
            .map_err(StoreError::redb("open asset_meta"))?;
        let found = meta_table
            .get(book_id)
            .map_err(StoreError::redb("get asset_meta"))?
            .is_some();
        Ok(found)
    }

    /// Remove the asset of `book_id`. Removing an absent asset is a no-op.
    pub fn delete(&self, book_id: &str) -> StoreResult<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(StoreError::redb("begin_write"))?;
        let existed = {
            let mut meta_table = txn
                .open_table(ASSET_META)
                .map_err(StoreError::redb("open asset_meta"))?;
            let mut data_table = txn
                .open_table(ASSET_DATA)
                .map_err(StoreError::redb("open asset_data"))?;
            let meta = meta_table
                .remove(book_id)
                .map_err(StoreError::redb("remove asset_meta"))?
                .is_some();
            let data = data_table
                .remove(book_id)
                .map_err(StoreError::redb("remove asset_data"))?
                .is_some();
            meta || data
        };
        txn.commit().map_err(StoreError::redb("commit"))?;

        if existed {
            info!(book_id, "asset deleted");
        }
        Ok(())
    }

    /// Metadata of every stored asset, ordered by book id.
    pub fn list(&self) -> StoreResult<Vec<AssetSummary>> {
        let txn = self
            .db
            .begin_read()
            .map_err(StoreError::redb("begin_read"))?;
        let meta_table = txn
            .open_table(ASSET_META)
            .map_err(StoreError::redb("open asset_meta"))?;
        read_summaries(&meta_table)
    }

    /// Sum of the raw sizes of all stored assets.
    pub fn storage_used(&self) -> StoreResult<u64> {
        Ok(self.list()?.iter().map(|s| s.size_bytes).sum())
    }
}

fn read_summaries(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
) -> StoreResult<Vec<AssetSummary>> {
    let mut summaries = Vec::new();
    for entry in table.iter().map_err(StoreError::redb("iterate asset_meta"))? {
        let (_key, value) = entry.map_err(StoreError::redb("read asset_meta"))?;
        summaries.push(serde_json::from_slice(value.value())?);
    }
    Ok(summaries)
}

impl fmt::Debug for BinaryAssetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryAssetStore")
            .field("limits", &self.limits)
            .finish()
    }
}
