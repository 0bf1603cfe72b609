//! Error types for the asset store, the document adapters and the reader session.
//!
//! Storage and parse failures are returned as values; navigation edge cases
//! (unresolvable tokens, paging past either end) never reach this module.

use thiserror::Error;

/// Failures of the redb-backed stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("database error: {message}")]
    Redb { message: String },

    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn redb<E: std::fmt::Display>(
        context: &str,
    ) -> impl FnOnce(E) -> StoreError + '_ {
        move |e| StoreError::Redb {
            message: format!("{context}: {e}"),
        }
    }
}

/// Outcome of a rejected asset operation.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset is too large: {size} bytes encoded, limit is {max}")]
    AssetTooLarge { size: u64, max: u64 },

    #[error("storage quota exceeded: {needed} bytes needed, {available} available")]
    StorageQuotaExceeded { needed: u64, available: u64 },

    #[error("no asset stored for book `{0}`")]
    NotFound(String),

    #[error("stored asset for book `{book_id}` is unreadable: {message}")]
    Corrupt { book_id: String, message: String },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl AssetError {
    /// True for the rejections a caller reports as "not enough room".
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            AssetError::AssetTooLarge { .. } | AssetError::StorageQuotaExceeded { .. }
        )
    }
}

/// A document payload could not be opened.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("corrupt {format} document: {message}")]
    Corrupt {
        format: &'static str,
        message: String,
    },

    #[error("{format} document has no readable content")]
    Empty { format: &'static str },
}

/// Session-level failures surfaced to the UI layer.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("document load was abandoned")]
    Cancelled,

    #[error("no document is open")]
    NotOpen,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type AssetResult<T> = std::result::Result<T, AssetError>;
pub type DocumentResult<T> = std::result::Result<T, DocumentError>;
