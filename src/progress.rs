use tracing::debug;

use crate::reader::DocumentModel;

/// How far into a book the reader is, in the document's own units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub current_unit: usize,
    pub total_units: usize,
    pub percentage: u8,
}

/// Receives progress for the book being read.
pub trait ProgressSink: Send {
    fn on_progress(&mut self, book_id: &str, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: FnMut(&str, ProgressUpdate) + Send,
{
    fn on_progress(&mut self, book_id: &str, update: ProgressUpdate) {
        self(book_id, update)
    }
}

/// Turns document positions into progress updates, emitting only when the
/// position actually changed.
pub struct ProgressCalculator {
    sink: Box<dyn ProgressSink>,
    last: Option<(String, String)>,
}

impl ProgressCalculator {
    pub fn new(sink: Box<dyn ProgressSink>) -> Self {
        Self { sink, last: None }
    }

    pub fn compute(doc: &dyn DocumentModel) -> ProgressUpdate {
        let (current_unit, total_units) = doc.units();
        ProgressUpdate {
            current_unit,
            total_units,
            percentage: doc.percentage(),
        }
    }

    /// Emit progress for `doc` unless it was already reported at this location.
    pub fn update(&mut self, book_id: &str, doc: &dyn DocumentModel) -> Option<ProgressUpdate> {
        let token = doc.current_location();
        if let Some((last_book, last_token)) = &self.last {
            if last_book == book_id && *last_token == token {
                return None;
            }
        }

        let update = Self::compute(doc);
        debug!(
            book_id,
            current = update.current_unit,
            total = update.total_units,
            percentage = update.percentage,
            "progress"
        );
        self.sink.on_progress(book_id, update);
        self.last = Some((book_id.to_string(), token));
        Some(update)
    }

    /// Forget the last reported location so the next update always emits.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl std::fmt::Debug for ProgressCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressCalculator")
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}
