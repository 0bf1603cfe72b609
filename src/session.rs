//! The reader session: one book at a time, from load to close.
//!
//! ```text
//! Idle -> Loading -> Ready <-> Navigating -> Closed
//!            \-> Error
//! ```
//!
//! `Navigating` means a position write is waiting out its debounce period.
//! Closing always destroys the mounted document. Dropping an unfinished
//! `open` future abandons the load; a following `close` writes nothing.

use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::asset_store::BinaryAssetStore;
use crate::config::FolioConfig;
use crate::error::{AssetError, ReaderError};
use crate::gesture::{Command, GestureController, InputEvent};
use crate::pdf_reader::ZoomChange;
use crate::position::PositionTracker;
use crate::progress::{ProgressCalculator, ProgressSink};
use crate::reader::{Document, DocumentModel, LayoutOptions, NavigationEntry};
use crate::settings::{ReaderSettings, ReaderSettingsStore};
use crate::surface::{RenderedView, RenderingSurface};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Ready,
    Navigating,
    Closed,
    Error(String),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Loading => f.write_str("loading"),
            Self::Ready => f.write_str("ready"),
            Self::Navigating => f.write_str("navigating"),
            Self::Closed => f.write_str("closed"),
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}

#[derive(Debug)]
pub struct ReaderSession {
    assets: Arc<BinaryAssetStore>,
    settings_store: Arc<ReaderSettingsStore>,
    viewport: crate::layout::Viewport,
    location_samples: usize,
    state: SessionState,
    book_id: Option<String>,
    surface: RenderingSurface,
    tracker: PositionTracker,
    progress: ProgressCalculator,
    gestures: GestureController,
}

impl ReaderSession {
    pub fn new(
        assets: Arc<BinaryAssetStore>,
        settings_store: Arc<ReaderSettingsStore>,
        config: &FolioConfig,
        sink: Box<dyn ProgressSink>,
    ) -> Result<Self, ReaderError> {
        let settings = settings_store.load_settings()?;
        Ok(Self {
            tracker: PositionTracker::new(settings_store.clone(), config.debounce()),
            assets,
            settings_store,
            viewport: config.viewport(),
            location_samples: config.location_samples,
            state: SessionState::Idle,
            book_id: None,
            surface: RenderingSurface::new(settings),
            progress: ProgressCalculator::new(sink),
            gestures: GestureController::new(config.swipe_threshold_px),
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn book_id(&self) -> Option<&str> {
        self.book_id.as_deref()
    }

    pub fn settings(&self) -> &ReaderSettings {
        self.surface.settings()
    }

    pub fn document(&self) -> Option<&Document> {
        self.surface.document()
    }

    /// Load `book_id` from the asset store and show its saved position.
    ///
    /// Any book already open is closed first.
    pub async fn open(&mut self, book_id: &str) -> Result<(), ReaderError> {
        if self.book_id.is_some() || self.state == SessionState::Loading {
            if let Err(e) = self.close() {
                warn!(error = %e, "closing previous book failed");
            }
        }

        self.state = SessionState::Loading;
        self.book_id = Some(book_id.to_string());
        debug!(book_id, "loading");

        let assets = Arc::clone(&self.assets);
        let id = book_id.to_string();
        let loaded = tokio::task::spawn_blocking(move || assets.get(&id))
            .await
            .map_err(|_| ReaderError::Cancelled)
            .and_then(|result| result.map_err(ReaderError::from));
        let asset = match loaded {
            Ok(Some(asset)) => asset,
            Ok(None) => return Err(self.fail(AssetError::NotFound(book_id.to_string()).into())),
            Err(e) => return Err(self.fail(e)),
        };

        let file_type = asset.summary.file_type;
        let options = LayoutOptions {
            viewport: self.viewport,
            font_size_percent: self.surface.settings().font_size.percent(),
            location_samples: self.location_samples,
        };
        let parsed = tokio::task::spawn_blocking(move || {
            Document::open(file_type, &asset.data, &options)
        })
        .await
        .map_err(|_| ReaderError::Cancelled)
        .and_then(|result| result.map_err(ReaderError::from));
        let document = match parsed {
            Ok(document) => document,
            Err(e) => return Err(self.fail(e)),
        };

        self.surface.mount(document);
        if let Some(doc) = self.surface.document_mut() {
            match self.tracker.restore(book_id, doc) {
                Ok(true) => {}
                Ok(false) => {
                    if let Err(e) = self.tracker.save_now(book_id, doc) {
                        warn!(book_id, error = %e, "could not save starting position");
                    }
                }
                Err(e) => warn!(book_id, error = %e, "could not read saved position"),
            }
            self.progress.reset();
            self.progress.update(book_id, doc);
            info!(
                book_id,
                file_type = %file_type,
                location = %doc.current_location(),
                "book opened"
            );
        }
        self.state = SessionState::Ready;
        Ok(())
    }

    fn fail(&mut self, error: ReaderError) -> ReaderError {
        warn!(book_id = ?self.book_id, error = %error, "open failed");
        self.state = SessionState::Error(error.to_string());
        error
    }

    pub fn next(&mut self, now: Instant) -> Result<bool, ReaderError> {
        self.navigate(now, |doc| doc.next())
    }

    pub fn prev(&mut self, now: Instant) -> Result<bool, ReaderError> {
        self.navigate(now, |doc| doc.prev())
    }

    /// Jump to `token`. Returns false when the token did not resolve and the
    /// first location is shown instead.
    pub fn display(&mut self, token: &str, now: Instant) -> Result<bool, ReaderError> {
        self.navigate(now, |doc| doc.display(token))
    }

    /// Jump to the `index`-th outline entry. Out-of-range indexes are ignored.
    pub fn goto_entry(&mut self, index: usize, now: Instant) -> Result<bool, ReaderError> {
        let Some(entry) = self.table_of_contents().into_iter().nth(index) else {
            return Ok(false);
        };
        self.display(&entry.location_token, now)
    }

    fn navigate(
        &mut self,
        now: Instant,
        step: impl FnOnce(&mut Document) -> bool,
    ) -> Result<bool, ReaderError> {
        if !matches!(self.state, SessionState::Ready | SessionState::Navigating) {
            return Err(ReaderError::NotOpen);
        }
        let book_id = self.book_id.as_deref().ok_or(ReaderError::NotOpen)?;
        let doc = self.surface.document_mut().ok_or(ReaderError::NotOpen)?;

        let before = doc.current_location();
        let result = step(doc);
        if doc.current_location() != before {
            self.tracker.record(book_id, doc, now);
            self.progress.update(book_id, doc);
            self.state = SessionState::Navigating;
        }
        Ok(result)
    }

    /// Route a touch or key event. Returns the command it produced, if any.
    pub fn handle_input(
        &mut self,
        event: InputEvent,
        now: Instant,
    ) -> Result<Option<Command>, ReaderError> {
        let Some(command) = self.gestures.handle(event) else {
            return Ok(None);
        };
        match command {
            Command::Next => {
                self.next(now)?;
            }
            Command::Prev => {
                self.prev(now)?;
            }
            Command::Close => self.close()?,
        }
        Ok(Some(command))
    }

    /// Change the zoom of a paged document. Reflowable documents have no
    /// zoom and return `None`.
    pub fn set_zoom(&mut self, change: ZoomChange) -> Result<Option<f32>, ReaderError> {
        let doc = self.surface.document_mut().ok_or(ReaderError::NotOpen)?;
        Ok(doc.as_paged_mut().map(|paged| paged.apply_zoom(change).value()))
    }

    /// Edit the global settings, persist them at once and restyle the
    /// open document in place.
    pub fn update_settings(
        &mut self,
        edit: impl FnOnce(&mut ReaderSettings),
    ) -> Result<ReaderSettings, ReaderError> {
        let mut settings = self.surface.settings().clone();
        edit(&mut settings);
        self.settings_store.save_settings(&settings)?;
        self.surface.apply_settings(settings.clone());
        Ok(settings)
    }

    /// Write the pending position once its quiet period is over.
    pub fn poll(&mut self, now: Instant) -> Result<bool, ReaderError> {
        let written = self.tracker.persist_due(now)?;
        if written && self.state == SessionState::Navigating {
            self.state = SessionState::Ready;
        }
        Ok(written)
    }

    /// When `poll` next has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tracker.deadline()
    }

    pub fn positions_written(&self) -> u64 {
        self.tracker.writes_committed()
    }

    /// Close the book. A pending position is written only if the book was
    /// fully open; the document is destroyed in every case.
    pub fn close(&mut self) -> Result<(), ReaderError> {
        let flushed = match self.state {
            SessionState::Ready | SessionState::Navigating => self.tracker.flush().map(|_| ()),
            _ => {
                self.tracker.cancel();
                Ok(())
            }
        };

        self.surface.unmount();
        self.progress.reset();
        if let Some(book_id) = self.book_id.take() {
            info!(book_id, from = %self.state, "book closed");
        }
        self.state = SessionState::Closed;
        flushed.map_err(ReaderError::from)
    }

    pub fn view(&self) -> Option<RenderedView> {
        self.surface.render()
    }

    pub fn table_of_contents(&self) -> Vec<NavigationEntry> {
        self.surface
            .document()
            .map(DocumentModel::table_of_contents)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_store::FileType;
    use crate::config::ViewportConfig;
    use crate::gesture::Key;
    use crate::location::LocationToken;
    use crate::progress::ProgressUpdate;
    use crate::settings::{FontSize, Theme};
    use crate::test_support;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        config: FolioConfig,
        assets: Arc<BinaryAssetStore>,
        settings: Arc<ReaderSettingsStore>,
        progress: Arc<Mutex<Vec<ProgressUpdate>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let config = FolioConfig {
                data_dir: dir.path().to_path_buf(),
                viewport: ViewportConfig {
                    columns: 40,
                    lines: 8,
                },
                ..FolioConfig::default()
            };
            let assets = Arc::new(BinaryAssetStore::from_config(&config).unwrap());
            let settings = Arc::new(ReaderSettingsStore::from_config(&config).unwrap());

            let b1 = test_support::epub_with_sections(
                "Book One",
                &[("One", 300), ("Two", 300), ("Three", 300)],
            );
            assets
                .save("b1", "one.epub", FileType::Reflowable, &b1)
                .unwrap();
            let b2 = test_support::pdf_with_pages(10);
            assets.save("b2", "two.pdf", FileType::Paged, &b2).unwrap();

            Self {
                _dir: dir,
                config,
                assets,
                settings,
                progress: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn session(&self) -> ReaderSession {
            let seen = self.progress.clone();
            let sink = move |_: &str, update: ProgressUpdate| seen.lock().unwrap().push(update);
            ReaderSession::new(
                self.assets.clone(),
                self.settings.clone(),
                &self.config,
                Box::new(sink),
            )
            .unwrap()
        }

        fn percentages(&self) -> Vec<u8> {
            self.progress
                .lock()
                .unwrap()
                .iter()
                .map(|u| u.percentage)
                .collect()
        }
    }

    fn location(session: &ReaderSession) -> String {
        session.document().unwrap().current_location()
    }

    #[tokio::test]
    async fn reflowable_book_resumes_in_same_section() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.open("b1").await.unwrap();
        assert_eq!(session.state(), &SessionState::Ready);

        let second = session.table_of_contents()[1].location_token.clone();
        assert!(session.display(&second, Instant::now()).unwrap());
        assert_eq!(session.state(), &SessionState::Navigating);
        session.close().unwrap();
        assert_eq!(session.state(), &SessionState::Closed);
        assert!(session.document().is_none());

        let mut reopened = fx.session();
        reopened.open("b1").await.unwrap();
        assert_eq!(location(&reopened), second);
        let view = reopened.view().unwrap();
        assert_eq!(view.view.heading.as_deref(), Some("Two"));
    }

    #[tokio::test]
    async fn reopen_restores_mid_section_token() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.open("b1").await.unwrap();

        let now = Instant::now();
        assert!(session.display("1/0", now).unwrap());
        assert!(session.next(now).unwrap());
        assert!(session.next(now).unwrap());
        let token = location(&session);
        let parsed: LocationToken = token.parse().unwrap();
        assert_eq!(parsed.section, 1);
        assert!(parsed.offset > 0);
        session.close().unwrap();

        let mut reopened = fx.session();
        reopened.open("b1").await.unwrap();
        assert_eq!(location(&reopened), token);
    }

    #[tokio::test]
    async fn first_open_records_starting_position() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.open("b2").await.unwrap();
        assert_eq!(session.positions_written(), 1);
        assert_eq!(session.next_deadline(), None);
        session.close().unwrap();

        let saved = fx.settings.load_position("b2", FileType::Paged).unwrap().unwrap();
        assert_eq!(saved.location_token, "1");
        assert_eq!(saved.percentage, 10);

        let mut reopened = fx.session();
        reopened.open("b2").await.unwrap();
        assert_eq!(reopened.positions_written(), 0);
    }

    #[tokio::test]
    async fn paged_zoom_is_independent_of_page() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.open("b2").await.unwrap();

        let now = Instant::now();
        for _ in 0..3 {
            assert!(session.next(now).unwrap());
        }
        assert_eq!(session.set_zoom(ZoomChange::Set(1.5)).unwrap(), Some(1.5));

        let doc = session.document().unwrap();
        assert_eq!(doc.current_location(), "4");
        assert_eq!(doc.zoom(), Some(1.5));
        assert_eq!(doc.percentage(), 40);
    }

    #[tokio::test]
    async fn rapid_paging_is_written_once() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.open("b2").await.unwrap();

        let before = session.positions_written();
        let start = Instant::now();
        for i in 0..6u64 {
            session.next(start + Duration::from_millis(i * 50)).unwrap();
            assert!(!session.poll(start + Duration::from_millis(i * 50)).unwrap());
        }
        let deadline = session.next_deadline().unwrap();
        assert!(session.poll(deadline).unwrap());
        assert!(!session.poll(deadline + Duration::from_secs(5)).unwrap());
        assert_eq!(session.positions_written(), before + 1);
        assert_eq!(session.state(), &SessionState::Ready);

        let saved = fx.settings.load_position("b2", FileType::Paged).unwrap().unwrap();
        assert_eq!(saved.location_token, "7");
        assert_eq!(saved.percentage, 70);
    }

    #[tokio::test]
    async fn paging_past_the_edges_changes_nothing() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.open("b2").await.unwrap();
        let now = Instant::now();

        assert!(!session.prev(now).unwrap());
        assert_eq!(location(&session), "1");
        assert_eq!(session.state(), &SessionState::Ready);
        assert_eq!(session.next_deadline(), None);

        assert!(session.display("10", now).unwrap());
        assert!(!session.next(now).unwrap());
        assert!(!session.next(now).unwrap());
        assert_eq!(location(&session), "10");
    }

    #[tokio::test]
    async fn progress_never_goes_backwards_while_reading_forward() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.open("b1").await.unwrap();

        let now = Instant::now();
        while session.next(now).unwrap() {}

        let seen = fx.percentages();
        assert!(seen.len() > 3);
        assert_eq!(seen[0], 0);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen.iter().all(|&p| p <= 100));
    }

    #[tokio::test]
    async fn close_during_load_writes_no_position() {
        let fx = Fixture::new();
        let mut session = fx.session();

        // Give up on the load straight away.
        let _ = tokio::time::timeout(Duration::ZERO, session.open("b1")).await;
        assert_eq!(session.state(), &SessionState::Loading);
        session.close().unwrap();

        assert_eq!(session.state(), &SessionState::Closed);
        assert!(session.document().is_none());
        assert_eq!(session.positions_written(), 0);
        assert!(fx
            .settings
            .load_position("b1", FileType::Reflowable)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn missing_and_corrupt_books_end_in_error_state() {
        let fx = Fixture::new();
        fx.assets
            .save("junk", "junk.pdf", FileType::Paged, b"definitely not a pdf")
            .unwrap();
        let mut session = fx.session();

        let err = session.open("nope").await.unwrap_err();
        assert!(matches!(err, ReaderError::Asset(AssetError::NotFound(_))));
        assert!(matches!(session.state(), SessionState::Error(_)));

        let err = session.open("junk").await.unwrap_err();
        assert!(matches!(err, ReaderError::Document(_)));
        assert!(matches!(session.state(), SessionState::Error(_)));
        assert!(matches!(
            session.next(Instant::now()),
            Err(ReaderError::NotOpen)
        ));

        session.close().unwrap();
        assert_eq!(session.state(), &SessionState::Closed);
    }

    #[tokio::test]
    async fn escape_closes_and_flushes_pending_position() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.open("b2").await.unwrap();
        let now = Instant::now();

        let swipe_left = [
            InputEvent::TouchStart { x: 300.0, y: 10.0 },
            InputEvent::TouchEnd { x: 100.0, y: 20.0 },
        ];
        for event in swipe_left {
            session.handle_input(event, now).unwrap();
        }
        assert_eq!(location(&session), "2");

        let command = session.handle_input(InputEvent::Key(Key::Escape), now).unwrap();
        assert_eq!(command, Some(Command::Close));
        assert_eq!(session.state(), &SessionState::Closed);
        let saved = fx.settings.load_position("b2", FileType::Paged).unwrap().unwrap();
        assert_eq!(saved.location_token, "2");
    }

    #[tokio::test]
    async fn settings_persist_immediately_and_keep_place() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.open("b1").await.unwrap();
        let now = Instant::now();
        session.next(now).unwrap();
        session.next(now).unwrap();
        let before = location(&session);

        session
            .update_settings(|s| {
                s.theme = Theme::Sepia;
                s.font_size = s.font_size.increase().increase();
            })
            .unwrap();

        assert_eq!(location(&session), before);
        let stored = fx.settings.load_settings().unwrap();
        assert_eq!(stored.theme, Theme::Sepia);
        assert_eq!(stored.font_size, FontSize::new(120));
        assert_eq!(session.view().unwrap().palette, Theme::Sepia.palette());
        assert_eq!(session.set_zoom(ZoomChange::In).unwrap(), None);
    }

    #[tokio::test]
    async fn opening_another_book_closes_the_first() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.open("b2").await.unwrap();
        session.next(Instant::now()).unwrap();

        session.open("b1").await.unwrap();
        assert_eq!(session.book_id(), Some("b1"));
        assert_eq!(
            session.document().unwrap().file_type(),
            FileType::Reflowable
        );
        let saved = fx.settings.load_position("b2", FileType::Paged).unwrap().unwrap();
        assert_eq!(saved.location_token, "2");

        assert!(session.goto_entry(2, Instant::now()).unwrap());
        assert_eq!(location(&session), "2/0");
        assert!(!session.goto_entry(99, Instant::now()).unwrap());
    }
}
