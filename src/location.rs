//! Location tokens for reflowable documents and the sampled index that turns
//! a token into a completion percentage.

use std::fmt;
use std::str::FromStr;

/// A position in a reflowable document: a section and a byte offset into its
/// flattened text. Serialized as `"{section}/{offset}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct LocationToken {
    pub section: usize,
    pub offset: usize,
}

impl LocationToken {
    pub fn new(section: usize, offset: usize) -> Self {
        Self { section, offset }
    }

    pub fn section_start(section: usize) -> Self {
        Self { section, offset: 0 }
    }
}

impl fmt::Display for LocationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.section, self.offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTokenError(String);

impl fmt::Display for ParseTokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed location token `{}`", self.0)
    }
}

impl std::error::Error for ParseTokenError {}

impl FromStr for LocationToken {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseTokenError(s.to_string());
        let (section, offset) = s.trim().split_once('/').ok_or_else(malformed)?;
        Ok(Self {
            section: section.parse().map_err(|_| malformed())?,
            offset: offset.parse().map_err(|_| malformed())?,
        })
    }
}

/// Evenly spaced anchors over the concatenated text of all sections.
///
/// Built once per open. The percentage of a token is the index of the last
/// anchor at or before it, divided by the anchor count.
#[derive(Debug, Clone, Default)]
pub struct LocationIndex {
    section_starts: Vec<usize>,
    samples: Vec<usize>,
    total_len: usize,
}

impl LocationIndex {
    pub fn build(section_lengths: &[usize], sample_count: usize) -> Self {
        let mut section_starts = Vec::with_capacity(section_lengths.len());
        let mut total_len = 0;
        for len in section_lengths {
            section_starts.push(total_len);
            total_len += len;
        }

        let count = sample_count.min(total_len).max(1);
        let samples = (0..count).map(|i| i * total_len / count).collect();

        Self {
            section_starts,
            samples,
            total_len,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Offset of `token` in the concatenated text.
    pub fn global_offset(&self, token: LocationToken) -> usize {
        let start = self
            .section_starts
            .get(token.section)
            .copied()
            .unwrap_or(self.total_len);
        start.saturating_add(token.offset).min(self.total_len)
    }

    /// Token of the `index`-th anchor.
    pub fn sample_token(&self, index: usize) -> Option<LocationToken> {
        let global = *self.samples.get(index)?;
        let section = self
            .section_starts
            .partition_point(|&start| start <= global)
            .saturating_sub(1);
        let start = self.section_starts.get(section).copied().unwrap_or(0);
        Some(LocationToken::new(section, global - start))
    }

    /// Index of the last anchor at or before `token`.
    pub fn nearest_sample(&self, token: LocationToken) -> usize {
        let global = self.global_offset(token);
        self.samples
            .partition_point(|&sample| sample <= global)
            .saturating_sub(1)
    }

    pub fn percentage(&self, token: LocationToken) -> u8 {
        if self.samples.is_empty() {
            return 0;
        }
        let index = self.nearest_sample(token);
        let percent = (index * 100 + self.samples.len() / 2) / self.samples.len();
        percent.min(100) as u8
    }
}
