//! Restoring and persisting where the reader is in a book.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::StoreResult;
use crate::reader::{Document, DocumentModel};
use crate::settings::{ReaderSettingsStore, ReadingPosition};

/// Holds the latest value until a quiet period has passed.
///
/// Every `schedule` replaces the pending value and pushes the deadline out,
/// so a burst of updates yields one value: the last one.
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            deadline: None,
        }
    }

    pub fn schedule(&mut self, value: T, now: Instant) {
        self.pending = Some(value);
        self.deadline = Some(now + self.delay);
    }

    /// The pending value, if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.flush(),
            _ => None,
        }
    }

    /// The pending value regardless of deadline.
    pub fn flush(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
        self.pending = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Reads a book's saved position on open and writes new ones, debounced.
#[derive(Debug)]
pub struct PositionTracker {
    store: Arc<ReaderSettingsStore>,
    writes: Debouncer<ReadingPosition>,
    committed: u64,
}

impl PositionTracker {
    pub fn new(store: Arc<ReaderSettingsStore>, debounce: Duration) -> Self {
        Self {
            store,
            writes: Debouncer::new(debounce),
            committed: 0,
        }
    }

    /// Show the saved position if the document still resolves it, else the
    /// first location. Returns whether a saved position was applied.
    pub fn restore(&self, book_id: &str, doc: &mut Document) -> StoreResult<bool> {
        let saved = self.store.load_position(book_id, doc.file_type())?;
        match saved {
            Some(position) if doc.resolves(&position.location_token) => {
                doc.display(&position.location_token);
                debug!(book_id, token = %position.location_token, "position restored");
                Ok(true)
            }
            Some(position) => {
                debug!(book_id, token = %position.location_token, "saved position no longer resolves");
                doc.display("");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Schedule a write of the document's current position.
    pub fn record(&mut self, book_id: &str, doc: &Document, now: Instant) {
        self.writes.schedule(Self::position_of(book_id, doc), now);
    }

    /// Write the document's current position immediately, replacing any
    /// pending one.
    pub fn save_now(&mut self, book_id: &str, doc: &Document) -> StoreResult<()> {
        self.writes.cancel();
        self.write(&Self::position_of(book_id, doc))
    }

    fn position_of(book_id: &str, doc: &Document) -> ReadingPosition {
        ReadingPosition {
            book_id: book_id.to_string(),
            file_type: doc.file_type(),
            location_token: doc.current_location(),
            percentage: doc.percentage(),
        }
    }

    /// Write the pending position if the quiet period is over.
    pub fn persist_due(&mut self, now: Instant) -> StoreResult<bool> {
        match self.writes.take_due(now) {
            Some(position) => self.write(&position).map(|()| true),
            None => Ok(false),
        }
    }

    /// Write the pending position now.
    pub fn flush(&mut self) -> StoreResult<bool> {
        match self.writes.flush() {
            Some(position) => self.write(&position).map(|()| true),
            None => Ok(false),
        }
    }

    /// Drop the pending position without writing it.
    pub fn cancel(&mut self) {
        self.writes.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.writes.deadline()
    }

    /// Number of positions written since creation.
    pub fn writes_committed(&self) -> u64 {
        self.committed
    }

    fn write(&mut self, position: &ReadingPosition) -> StoreResult<()> {
        self.store.save_position(position)?;
        self.committed += 1;
        info!(
            book_id = %position.book_id,
            token = %position.location_token,
            percentage = position.percentage,
            "position saved"
        );
        Ok(())
    }
}
