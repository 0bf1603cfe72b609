use std::fmt;

use crate::reader::{Document, DocumentModel, PageView};
use crate::settings::{ReaderSettings, Theme};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: Rgb,
    pub foreground: Rgb,
}

impl Theme {
    pub const fn palette(self) -> Palette {
        match self {
            Self::Light => Palette {
                background: Rgb(0xff, 0xff, 0xff),
                foreground: Rgb(0x00, 0x00, 0x00),
            },
            Self::Dark => Palette {
                background: Rgb(0x1a, 0x1a, 0x1a),
                foreground: Rgb(0xe0, 0xe0, 0xe0),
            },
            Self::Sepia => Palette {
                background: Rgb(0xf4, 0xec, 0xd8),
                foreground: Rgb(0x5b, 0x46, 0x36),
            },
        }
    }
}

/// Everything needed to draw the current page.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedView {
    pub palette: Palette,
    pub font_family: String,
    pub font_size_percent: u8,
    pub zoom: Option<f32>,
    pub view: PageView,
}

/// Hosts at most one document and styles it with the reader settings.
#[derive(Debug, Default)]
pub struct RenderingSurface {
    settings: ReaderSettings,
    document: Option<Document>,
}

impl RenderingSurface {
    pub fn new(settings: ReaderSettings) -> Self {
        Self {
            settings,
            document: None,
        }
    }

    /// Show `document`, destroying whatever was shown before.
    pub fn mount(&mut self, mut document: Document) {
        self.unmount();
        document.relayout(self.settings.font_size.percent());
        self.document = Some(document);
    }

    pub fn unmount(&mut self) {
        if let Some(mut previous) = self.document.take() {
            previous.destroy();
        }
    }

    /// Restyle in place. Only a font size change touches the layout, and it
    /// keeps the current location.
    pub fn apply_settings(&mut self, settings: ReaderSettings) {
        if settings.font_size != self.settings.font_size {
            if let Some(doc) = &mut self.document {
                doc.relayout(settings.font_size.percent());
            }
        }
        self.settings = settings;
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn document_mut(&mut self) -> Option<&mut Document> {
        self.document.as_mut()
    }

    pub fn render(&self) -> Option<RenderedView> {
        let doc = self.document.as_ref()?;
        Some(RenderedView {
            palette: self.settings.theme.palette(),
            font_family: self.settings.font_family.clone(),
            font_size_percent: self.settings.font_size.percent(),
            zoom: doc.zoom(),
            view: doc.page_view(),
        })
    }
}
