use lopdf::{Document, Object};
use tracing::{debug, warn};

use crate::asset_store::FileType;
use crate::error::{DocumentError, DocumentResult};
use crate::layout::{self, Viewport};
use crate::reader::{DocumentModel, LayoutOptions, NavigationEntry, PageView};

const FORMAT: &str = "pdf";

/// Zoom factor of a fixed-layout page: 0.5 to 3.0 in steps of 0.25.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Zoom(f32);

impl Zoom {
    pub const MIN: f32 = 0.5;
    pub const MAX: f32 = 3.0;
    pub const STEP: f32 = 0.25;

    pub fn new(value: f32) -> Self {
        if !value.is_finite() {
            return Self::default();
        }
        let snapped = (value / Self::STEP).round() * Self::STEP;
        Self(snapped.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    pub fn zoom_in(self) -> Self {
        Self::new(self.0 + Self::STEP)
    }

    pub fn zoom_out(self) -> Self {
        Self::new(self.0 - Self::STEP)
    }

    pub fn percent(self) -> u32 {
        (self.0 * 100.0).round() as u32
    }
}

impl Default for Zoom {
    fn default() -> Self {
        Self(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoomChange {
    In,
    Out,
    Reset,
    Set(f32),
}

/// A fixed-layout document addressed by 1-based page number.
///
/// Page text is extracted once on open; the parsed PDF is not kept.
#[derive(Debug)]
pub struct PagedDocument {
    pages: Vec<String>,
    title: Option<String>,
    current: usize,
    zoom: Zoom,
    outline: Vec<NavigationEntry>,
    viewport: Viewport,
}

impl PagedDocument {
    pub fn open(data: &[u8], options: &LayoutOptions) -> DocumentResult<Self> {
        let doc = Document::load_mem(data).map_err(|e| DocumentError::Corrupt {
            format: FORMAT,
            message: e.to_string(),
        })?;

        let page_numbers: Vec<u32> = doc.get_pages().into_keys().collect();
        if page_numbers.is_empty() {
            return Err(DocumentError::Empty { format: FORMAT });
        }
        let pages: Vec<String> = page_numbers
            .iter()
            .map(|&number| page_text(&doc, number))
            .collect();

        let title = info_title(&doc);
        let outline = outline(&doc, pages.len());
        debug!(pages = pages.len(), outline = outline.len(), "pdf opened");

        Ok(Self {
            pages,
            title,
            current: 1,
            zoom: Zoom::default(),
            outline,
            viewport: options.viewport,
        })
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn current_page(&self) -> usize {
        self.current
    }

    pub fn zoom(&self) -> Zoom {
        self.zoom
    }

    pub fn apply_zoom(&mut self, change: ZoomChange) -> Zoom {
        self.zoom = match change {
            ZoomChange::In => self.zoom.zoom_in(),
            ZoomChange::Out => self.zoom.zoom_out(),
            ZoomChange::Reset => Zoom::default(),
            ZoomChange::Set(value) => Zoom::new(value),
        };
        self.zoom
    }

    /// Extracted text of the current page.
    pub fn page_text(&self) -> &str {
        self.current
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .map_or("", String::as_str)
    }

    fn parse_page(&self, token: &str) -> Option<usize> {
        let page: usize = token.trim().parse().ok()?;
        (1..=self.page_count()).contains(&page).then_some(page)
    }
}

impl DocumentModel for PagedDocument {
    fn file_type(&self) -> FileType {
        FileType::Paged
    }

    fn display(&mut self, token: &str) -> bool {
        if self.pages.is_empty() {
            return false;
        }
        match self.parse_page(token) {
            Some(page) => {
                self.current = page;
                true
            }
            None => {
                debug!(token, "unresolvable page token, showing page 1");
                self.current = 1;
                false
            }
        }
    }

    fn resolves(&self, token: &str) -> bool {
        self.parse_page(token).is_some()
    }

    fn next(&mut self) -> bool {
        if self.current >= self.page_count() {
            return false;
        }
        self.current += 1;
        true
    }

    fn prev(&mut self) -> bool {
        if self.current <= 1 {
            return false;
        }
        self.current -= 1;
        true
    }

    fn current_location(&self) -> String {
        self.current.to_string()
    }

    fn percentage(&self) -> u8 {
        let total = self.page_count();
        if total == 0 {
            return 0;
        }
        let percent = (self.current * 100 + total / 2) / total;
        percent.min(100) as u8
    }

    fn units(&self) -> (usize, usize) {
        (self.current, self.page_count())
    }

    fn table_of_contents(&self) -> Vec<NavigationEntry> {
        self.outline.clone()
    }

    fn page_view(&self) -> PageView {
        let text = self.page_text();
        let viewport = self.viewport.scaled(self.zoom.percent());
        let lines = layout::wrap_lines(text, viewport.columns)
            .into_iter()
            .map(|range| text[range].to_string())
            .collect();

        PageView {
            heading: Some(format!("Page {} of {}", self.current, self.page_count())),
            lines,
            location_token: self.current_location(),
            percentage: self.percentage(),
        }
    }

    fn destroy(&mut self) {
        self.pages = Vec::new();
        self.outline = Vec::new();
        self.current = 0;
    }
}

fn page_text(doc: &Document, number: u32) -> String {
    match doc.extract_text(&[number]) {
        Ok(text) => text,
        Err(e) => {
            warn!(page = number, error = %e, "text extraction failed");
            String::new()
        }
    }
}

fn info_title(doc: &Document) -> Option<String> {
    let info = doc.trailer.get(b"Info").ok()?;
    let dict = match info {
        Object::Reference(id) => doc.get_dictionary(*id).ok()?,
        Object::Dictionary(dict) => dict,
        _ => return None,
    };
    let raw = dict.get(b"Title").ok()?.as_str().ok()?;
    let title = String::from_utf8_lossy(raw).trim().to_string();
    (!title.is_empty()).then_some(title)
}

/// Document outline flattened to entries. Missing or broken outlines give
/// an empty list; nested entries are indented by level.
fn outline(doc: &Document, page_count: usize) -> Vec<NavigationEntry> {
    let toc = match doc.get_toc() {
        Ok(toc) => toc,
        Err(e) => {
            debug!(error = %e, "no usable outline");
            return Vec::new();
        }
    };
    toc.toc
        .into_iter()
        .filter(|entry| (1..=page_count).contains(&entry.page))
        .map(|entry| NavigationEntry {
            label: format!(
                "{}{}",
                "  ".repeat(entry.level.saturating_sub(1)),
                entry.title.trim()
            ),
            location_token: entry.page.to_string(),
        })
        .collect()
}
