//! Character-cell pagination of flowing text.
//!
//! Offsets are byte offsets into the section text and always sit on char
//! boundaries. Pages never span sections.

use std::ops::Range;

const MIN_COLUMNS: usize = 8;
const MIN_LINES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub columns: usize,
    pub lines: usize,
}

impl Viewport {
    pub fn new(columns: usize, lines: usize) -> Self {
        Self {
            columns: columns.max(MIN_COLUMNS),
            lines: lines.max(MIN_LINES),
        }
    }

    /// The viewport as seen through a font scaled to `percent` of normal:
    /// bigger type fits fewer cells.
    pub fn scaled(self, percent: u32) -> Self {
        let percent = percent.max(1) as usize;
        Self::new(self.columns * 100 / percent, self.lines * 100 / percent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSpan {
    pub start: usize,
    pub end: usize,
    pub lines: Vec<Range<usize>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionLayout {
    pages: Vec<PageSpan>,
}

impl SectionLayout {
    pub fn paginate(text: &str, viewport: Viewport) -> Self {
        let lines = wrap_lines(text, viewport.columns);
        let mut pages: Vec<PageSpan> = lines
            .chunks(viewport.lines)
            .map(|chunk| PageSpan {
                start: chunk.first().map_or(0, |l| l.start),
                end: chunk.last().map_or(0, |l| l.end),
                lines: chunk.to_vec(),
            })
            .collect();
        if pages.is_empty() {
            pages.push(PageSpan {
                start: 0,
                end: 0,
                lines: Vec::new(),
            });
        }
        Self { pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> Option<&PageSpan> {
        self.pages.get(index)
    }

    /// Index of the page showing `offset`: the last page starting at or before it.
    pub fn page_containing(&self, offset: usize) -> usize {
        self.pages
            .partition_point(|page| page.start <= offset)
            .saturating_sub(1)
    }
}

/// Greedy word wrap. Each source line (paragraph) starts a new output line;
/// words longer than `columns` are split across lines.
pub fn wrap_lines(text: &str, columns: usize) -> Vec<Range<usize>> {
    let columns = columns.max(1);
    let mut lines = Vec::new();
    let mut line_start = 0;

    for raw_line in text.split('\n') {
        let base = line_start;
        line_start += raw_line.len() + 1;

        if raw_line.trim().is_empty() {
            lines.push(base..base);
            continue;
        }

        let mut current: Option<(Range<usize>, usize)> = None;
        for word in words(raw_line, base) {
            for piece in split_long_word(text, word, columns) {
                let width = text[piece.clone()].chars().count();
                current = match current {
                    None => Some((piece, width)),
                    Some((range, used)) if used + 1 + width <= columns => {
                        Some((range.start..piece.end, used + 1 + width))
                    }
                    Some((range, _)) => {
                        lines.push(range);
                        Some((piece, width))
                    }
                };
            }
        }
        if let Some((range, _)) = current {
            lines.push(range);
        }
    }
    lines
}

/// Byte ranges of the whitespace-separated words of `line`, offset by `base`.
fn words(line: &str, base: usize) -> Vec<Range<usize>> {
    let mut result = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, ch) in line.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(s)) => {
                result.push(base + s..base + idx);
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(s) = start {
        result.push(base + s..base + line.len());
    }
    result
}

fn split_long_word(text: &str, word: Range<usize>, columns: usize) -> Vec<Range<usize>> {
    let slice = &text[word.clone()];
    if slice.chars().count() <= columns {
        return vec![word];
    }
    let mut pieces = Vec::new();
    let mut piece_start = word.start;
    for (count, (idx, _)) in slice.char_indices().enumerate() {
        if count > 0 && count % columns == 0 {
            pieces.push(piece_start..word.start + idx);
            piece_start = word.start + idx;
        }
    }
    pieces.push(piece_start..word.end);
    pieces
}
