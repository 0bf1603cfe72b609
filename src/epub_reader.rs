use rbook::prelude::*;
use rbook::Epub;
use std::io::Cursor;
use tracing::debug;

use crate::asset_store::FileType;
use crate::error::{DocumentError, DocumentResult};
use crate::layout::{SectionLayout, Viewport};
use crate::location::{LocationIndex, LocationToken};
use crate::reader::{DocumentModel, LayoutOptions, NavigationEntry, PageView};
use crate::text;

const FORMAT: &str = "epub";

/// One spine item, flattened to plain text
#[derive(Debug, Clone)]
pub struct Section {
    pub title: Option<String>,
    pub text: String,
}

/// A reflowable book paginated into viewport pages.
///
/// The reading anchor is a byte offset into the current section. Paging
/// moves the anchor to the start of the neighbouring page; re-pagination
/// keeps the anchor and finds the page that now shows it.
#[derive(Debug)]
pub struct ReflowableDocument {
    title: Option<String>,
    sections: Vec<Section>,
    layouts: Vec<SectionLayout>,
    index: LocationIndex,
    viewport: Viewport,
    font_size_percent: u8,
    anchor: LocationToken,
    page: usize,
}

impl ReflowableDocument {
    /// Parse an EPUB container and paginate its spine.
    pub fn open(data: &[u8], options: &LayoutOptions) -> DocumentResult<Self> {
        let corrupt = |message: String| DocumentError::Corrupt {
            format: FORMAT,
            message,
        };

        let epub = Epub::options()
            .strict(false)
            .read(Cursor::new(data.to_vec()))
            .map_err(|e| corrupt(e.to_string()))?;
        let title = epub.metadata().title().map(|t| t.value().to_string());

        let mut sections = Vec::new();
        let mut reader = epub.reader();
        while let Some(result) = reader.read_next() {
            let content = result.map_err(|e| corrupt(e.to_string()))?;
            let html = content.content().to_string();

            let text = text::html_to_text(&html);
            // Skip empty or near-empty content
            if text.is_empty() {
                continue;
            }
            sections.push(Section {
                title: text::first_heading(&html),
                text,
            });
        }

        Self::from_sections(title, sections, options)
    }

    pub fn from_sections(
        title: Option<String>,
        sections: Vec<Section>,
        options: &LayoutOptions,
    ) -> DocumentResult<Self> {
        if sections.is_empty() {
            return Err(DocumentError::Empty { format: FORMAT });
        }

        let lengths: Vec<usize> = sections.iter().map(|s| s.text.len()).collect();
        let index = LocationIndex::build(&lengths, options.location_samples);
        debug!(
            sections = sections.len(),
            samples = index.len(),
            "location index built"
        );

        let mut doc = Self {
            title,
            sections,
            layouts: Vec::new(),
            index,
            viewport: options.viewport,
            font_size_percent: options.font_size_percent,
            anchor: LocationToken::default(),
            page: 0,
        };
        doc.paginate();
        Ok(doc)
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn location(&self) -> LocationToken {
        self.anchor
    }

    /// Zero-based page within the current section, and the section's page count
    pub fn page_in_section(&self) -> (usize, usize) {
        let count = self
            .layouts
            .get(self.anchor.section)
            .map_or(0, SectionLayout::page_count);
        (self.page, count)
    }

    pub fn relayout(&mut self, font_size_percent: u8) {
        if font_size_percent == self.font_size_percent {
            return;
        }
        self.font_size_percent = font_size_percent;
        self.paginate();
    }

    fn paginate(&mut self) {
        let viewport = self.viewport.scaled(u32::from(self.font_size_percent));
        self.layouts = self
            .sections
            .iter()
            .map(|s| SectionLayout::paginate(&s.text, viewport))
            .collect();
        self.page = self
            .layouts
            .get(self.anchor.section)
            .map_or(0, |layout| layout.page_containing(self.anchor.offset));
    }

    fn parse_token(&self, token: &str) -> Option<LocationToken> {
        let location: LocationToken = token.parse().ok()?;
        let section = self.sections.get(location.section)?;
        let valid = location.offset <= section.text.len()
            && section.text.is_char_boundary(location.offset);
        valid.then_some(location)
    }

    fn move_to_page(&mut self, section: usize, page: usize) {
        let start = self
            .layouts
            .get(section)
            .and_then(|layout| layout.page(page))
            .map_or(0, |span| span.start);
        self.anchor = LocationToken::new(section, start);
        self.page = page;
    }
}

impl DocumentModel for ReflowableDocument {
    fn file_type(&self) -> FileType {
        FileType::Reflowable
    }

    fn display(&mut self, token: &str) -> bool {
        if self.sections.is_empty() {
            return false;
        }
        match self.parse_token(token) {
            Some(location) => {
                self.anchor = location;
                self.page = self.layouts[location.section].page_containing(location.offset);
                true
            }
            None => {
                debug!(token, "unresolvable location token, showing first section");
                self.move_to_page(0, 0);
                false
            }
        }
    }

    fn resolves(&self, token: &str) -> bool {
        self.parse_token(token).is_some()
    }

    fn next(&mut self) -> bool {
        let Some(layout) = self.layouts.get(self.anchor.section) else {
            return false;
        };
        if self.page + 1 < layout.page_count() {
            self.move_to_page(self.anchor.section, self.page + 1);
        } else if self.anchor.section + 1 < self.sections.len() {
            self.move_to_page(self.anchor.section + 1, 0);
        } else {
            return false;
        }
        true
    }

    fn prev(&mut self) -> bool {
        if self.layouts.is_empty() {
            return false;
        }
        if self.page > 0 {
            self.move_to_page(self.anchor.section, self.page - 1);
        } else if self.anchor.section > 0 {
            let section = self.anchor.section - 1;
            let last = self.layouts[section].page_count().saturating_sub(1);
            self.move_to_page(section, last);
        } else {
            return false;
        }
        true
    }

    fn current_location(&self) -> String {
        self.anchor.to_string()
    }

    fn percentage(&self) -> u8 {
        self.index.percentage(self.anchor)
    }

    fn units(&self) -> (usize, usize) {
        if self.index.is_empty() {
            return (0, 0);
        }
        (self.index.nearest_sample(self.anchor), self.index.len())
    }

    fn table_of_contents(&self) -> Vec<NavigationEntry> {
        self.sections
            .iter()
            .enumerate()
            .map(|(i, section)| NavigationEntry {
                label: section
                    .title
                    .clone()
                    .unwrap_or_else(|| format!("Chapter {}", i + 1)),
                location_token: LocationToken::section_start(i).to_string(),
            })
            .collect()
    }

    fn page_view(&self) -> PageView {
        let section = self.sections.get(self.anchor.section);
        let lines: Vec<String> = section
            .zip(self.layouts.get(self.anchor.section))
            .and_then(|(section, layout)| {
                let span = layout.page(self.page)?;
                Some(
                    span.lines
                        .iter()
                        .map(|range| section.text[range.clone()].to_string())
                        .collect(),
                )
            })
            .unwrap_or_default();

        PageView {
            heading: section.and_then(|s| s.title.clone()),
            lines,
            location_token: self.current_location(),
            percentage: self.percentage(),
        }
    }

    fn destroy(&mut self) {
        self.sections = Vec::new();
        self.layouts = Vec::new();
        self.index = LocationIndex::default();
        self.anchor = LocationToken::default();
        self.page = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn options(columns: usize, lines: usize) -> LayoutOptions {
        LayoutOptions {
            viewport: Viewport::new(columns, lines),
            font_size_percent: 100,
            location_samples: 1024,
        }
    }

    fn three_sections() -> ReflowableDocument {
        let sections = (1..=3)
            .map(|n| Section {
                title: Some(format!("Part {n}")),
                text: test_support::words(120, n),
            })
            .collect();
        ReflowableDocument::from_sections(Some("Sample".into()), sections, &options(30, 5)).unwrap()
    }

    #[test]
    fn opens_epub_container() {
        let epub = test_support::epub_with_sections(
            "Three Parts",
            &[("Alpha", 40), ("Beta", 40), ("Gamma", 40)],
        );
        let doc = ReflowableDocument::open(&epub, &options(40, 6)).unwrap();

        assert_eq!(doc.title(), Some("Three Parts"));
        assert_eq!(doc.section_count(), 3);
        let labels: Vec<String> = doc.table_of_contents().into_iter().map(|e| e.label).collect();
        assert_eq!(labels, vec!["Alpha", "Beta", "Gamma"]);
        assert_eq!(doc.current_location(), "0/0");
    }

    #[test]
    fn invalid_container_is_corrupt() {
        let err = ReflowableDocument::open(b"PK\x03\x04 truncated", &options(40, 6)).unwrap_err();
        assert!(matches!(err, DocumentError::Corrupt { .. }));
    }

    #[test]
    fn no_sections_is_empty() {
        let err = ReflowableDocument::from_sections(None, Vec::new(), &options(40, 6)).unwrap_err();
        assert!(matches!(err, DocumentError::Empty { .. }));
    }

    #[test]
    fn paging_crosses_sections_and_stops_at_edges() {
        let mut doc = three_sections();
        assert!(!doc.prev());
        assert_eq!(doc.current_location(), "0/0");

        let (_, pages_in_first) = doc.page_in_section();
        for _ in 0..pages_in_first {
            assert!(doc.next());
        }
        assert_eq!(doc.location(), LocationToken::new(1, 0));

        assert!(doc.prev());
        assert_eq!(doc.location().section, 0);
        assert_eq!(doc.page_in_section().0, pages_in_first - 1);

        while doc.next() {}
        let last = doc.current_location();
        assert!(!doc.next());
        assert_eq!(doc.current_location(), last);
        assert_eq!(doc.location().section, 2);
    }

    #[test]
    fn percentage_never_decreases_while_paging_forward() {
        let mut doc = three_sections();
        let mut last = doc.percentage();
        assert_eq!(last, 0);
        while doc.next() {
            let pct = doc.percentage();
            assert!(pct >= last && pct <= 100);
            last = pct;
        }
        assert!(last > 90);
    }

    #[test]
    fn display_resolves_tokens_into_sections() {
        let mut doc = three_sections();
        assert!(doc.display("1/0"));
        assert_eq!(doc.page_view().heading.as_deref(), Some("Part 2"));

        let mid = doc.sections[2].text.len() / 2;
        let mid = (mid..).find(|&i| doc.sections[2].text.is_char_boundary(i)).unwrap();
        let token = LocationToken::new(2, mid).to_string();
        assert!(doc.display(&token));
        assert_eq!(doc.current_location(), token);
        assert!(doc.page_in_section().0 > 0);
    }

    #[test]
    fn invalid_tokens_fall_back_to_first_section() {
        let mut doc = three_sections();
        doc.display("2/0");
        for bad in ["9/0", "0/999999", "garbage", ""] {
            assert!(!doc.display(bad), "{bad}");
            assert_eq!(doc.current_location(), "0/0");
            doc.display("2/0");
        }
        assert!(!doc.resolves("3/0"));
        assert!(doc.resolves("2/0"));
    }

    #[test]
    fn larger_font_keeps_anchor_and_adds_pages() {
        let mut doc = three_sections();
        doc.display("1/0");
        doc.next();
        doc.next();
        let anchor = doc.current_location();
        let (_, pages_before) = doc.page_in_section();

        doc.relayout(150);

        assert_eq!(doc.current_location(), anchor);
        assert!(doc.page_in_section().1 > pages_before);
        let view = doc.page_view();
        assert!(!view.lines.is_empty());
    }

    #[test]
    fn toc_tokens_point_at_section_starts() {
        let mut doc = three_sections();
        let toc = doc.table_of_contents();
        assert_eq!(toc.len(), 3);
        assert!(doc.display(&toc[2].location_token));
        assert_eq!(doc.location(), LocationToken::new(2, 0));
    }

    #[test]
    fn destroy_releases_content_and_disables_navigation() {
        let mut doc = three_sections();
        doc.destroy();
        assert_eq!(doc.section_count(), 0);
        assert!(!doc.next());
        assert!(!doc.prev());
        assert!(!doc.display("0/0"));
        assert!(doc.table_of_contents().is_empty());
        assert_eq!(doc.units(), (0, 0));
    }
}
