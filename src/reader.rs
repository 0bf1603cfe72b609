use crate::asset_store::FileType;
use crate::epub_reader::ReflowableDocument;
use crate::error::DocumentResult;
use crate::layout::Viewport;
use crate::pdf_reader::PagedDocument;

/// One line of the outline panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEntry {
    pub label: String,
    pub location_token: String,
}

/// What the viewport shows right now
#[derive(Debug, Clone, PartialEq)]
pub struct PageView {
    pub heading: Option<String>,
    pub lines: Vec<String>,
    pub location_token: String,
    pub percentage: u8,
}

/// Layout inputs shared by both formats
#[derive(Debug, Clone, Copy)]
pub struct LayoutOptions {
    pub viewport: Viewport,
    pub font_size_percent: u8,
    /// Anchor count of the reflowable location index
    pub location_samples: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            viewport: Viewport::new(72, 24),
            font_size_percent: 100,
            location_samples: 1024,
        }
    }
}

/// Navigation contract shared by all document formats.
///
/// Tokens are opaque outside the implementing type. Navigation never fails:
/// an unresolvable token falls back to the first location and paging past
/// either end leaves the position unchanged.
pub trait DocumentModel {
    fn file_type(&self) -> FileType;
    /// Show the location named by `token`. Returns false when the token did
    /// not resolve and the first location is shown instead.
    fn display(&mut self, token: &str) -> bool;
    /// Whether `token` names a location in this document
    fn resolves(&self, token: &str) -> bool;
    /// Advance one viewport page. Returns false at the end.
    fn next(&mut self) -> bool;
    /// Go back one viewport page. Returns false at the start.
    fn prev(&mut self) -> bool;
    fn current_location(&self) -> String;
    /// Completion in [0, 100]
    fn percentage(&self) -> u8;
    /// Absolute position as (current unit, total units)
    fn units(&self) -> (usize, usize);
    fn table_of_contents(&self) -> Vec<NavigationEntry>;
    fn page_view(&self) -> PageView;
    /// Release parsed content. Navigation afterwards is a no-op.
    fn destroy(&mut self);
}

/// An open document of either format, selected by the declared file type
#[derive(Debug)]
pub enum Document {
    Reflowable(ReflowableDocument),
    Paged(PagedDocument),
}

impl Document {
    pub fn open(file_type: FileType, data: &[u8], options: &LayoutOptions) -> DocumentResult<Self> {
        match file_type {
            FileType::Reflowable => ReflowableDocument::open(data, options).map(Self::Reflowable),
            FileType::Paged => PagedDocument::open(data, options).map(Self::Paged),
        }
    }

    fn model(&self) -> &dyn DocumentModel {
        match self {
            Self::Reflowable(doc) => doc,
            Self::Paged(doc) => doc,
        }
    }

    fn model_mut(&mut self) -> &mut dyn DocumentModel {
        match self {
            Self::Reflowable(doc) => doc,
            Self::Paged(doc) => doc,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Reflowable(doc) => doc.title(),
            Self::Paged(doc) => doc.title(),
        }
    }

    /// Re-paginate for a new font size, keeping the current location.
    /// Fixed pages are unaffected.
    pub fn relayout(&mut self, font_size_percent: u8) {
        if let Self::Reflowable(doc) = self {
            doc.relayout(font_size_percent);
        }
    }

    pub fn as_paged_mut(&mut self) -> Option<&mut PagedDocument> {
        match self {
            Self::Paged(doc) => Some(doc),
            Self::Reflowable(_) => None,
        }
    }

    pub fn zoom(&self) -> Option<f32> {
        match self {
            Self::Paged(doc) => Some(doc.zoom().value()),
            Self::Reflowable(_) => None,
        }
    }
}

impl DocumentModel for Document {
    fn file_type(&self) -> FileType {
        self.model().file_type()
    }

    fn display(&mut self, token: &str) -> bool {
        self.model_mut().display(token)
    }

    fn resolves(&self, token: &str) -> bool {
        self.model().resolves(token)
    }

    fn next(&mut self) -> bool {
        self.model_mut().next()
    }

    fn prev(&mut self) -> bool {
        self.model_mut().prev()
    }

    fn current_location(&self) -> String {
        self.model().current_location()
    }

    fn percentage(&self) -> u8 {
        self.model().percentage()
    }

    fn units(&self) -> (usize, usize) {
        self.model().units()
    }

    fn table_of_contents(&self) -> Vec<NavigationEntry> {
        self.model().table_of_contents()
    }

    fn page_view(&self) -> PageView {
        self.model().page_view()
    }

    fn destroy(&mut self) {
        self.model_mut().destroy()
    }
}
