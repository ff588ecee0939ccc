// LogWeave - core/modification.rs
//
// Value types describing how the content of a log source changed.
//
// Sources only ever grow at the end, or lose a suffix. `Removed` therefore
// always means "everything from `index` onward is no longer valid"; the
// count is informational (how many rows the receiver had seen there).

use crate::core::model::LineIndex;
use std::fmt;

/// A contiguous range of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Section {
    pub index: LineIndex,
    pub count: usize,
}

impl Section {
    pub fn new(index: impl Into<LineIndex>, count: usize) -> Self {
        Self {
            index: index.into(),
            count,
        }
    }

    /// The first row index, or 0 for an invalid section.
    pub fn start(&self) -> usize {
        self.index.get().unwrap_or(0)
    }

    /// One past the last row.
    pub fn end(&self) -> usize {
        self.start() + self.count
    }

    pub fn last_index(&self) -> LineIndex {
        if self.count == 0 {
            LineIndex::INVALID
        } else {
            LineIndex::from(self.end() - 1)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether `index` is the last row of this section.
    pub fn is_end_of_section(&self, index: LineIndex) -> bool {
        index.is_valid() && index == self.last_index()
    }

    pub fn contains(&self, index: LineIndex) -> bool {
        index
            .get()
            .map(|i| i >= self.start() && i < self.end())
            .unwrap_or(false)
    }

    /// All row indices covered by this section, in order.
    pub fn indices(&self) -> Vec<LineIndex> {
        (self.start()..self.end()).map(LineIndex::from).collect()
    }

    /// The smallest section covering both `self` and `other`.
    pub fn minimum_bounding(&self, other: &Section) -> Section {
        let start = self.start().min(other.start());
        let end = self.end().max(other.end());
        Section::new(start, end - start)
    }

    /// Splits the section into consecutive chunks of at most `max` rows.
    pub fn split(&self, max: usize) -> Vec<Section> {
        let max = max.max(1);
        let mut chunks = Vec::with_capacity(self.count.div_ceil(max));
        let mut start = self.start();
        let end = self.end();
        while start < end {
            let count = max.min(end - start);
            chunks.push(Section::new(start, count));
            start += count;
        }
        chunks
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start(), self.end())
    }
}

/// What changed in a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modification {
    /// Rows were added at the end.
    Appended(Section),
    /// Rows from `section.index` onward were invalidated.
    Removed(Section),
    /// All content is gone.
    Reset,
}

impl Modification {
    pub fn appended(index: usize, count: usize) -> Self {
        Self::Appended(Section::new(index, count))
    }

    pub fn removed(index: usize, count: usize) -> Self {
        Self::Removed(Section::new(index, count))
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, Self::Reset)
    }

    pub fn is_appended(&self) -> bool {
        matches!(self, Self::Appended(_))
    }

    /// The affected section, if any.
    pub fn section(&self) -> Option<Section> {
        match self {
            Self::Appended(section) | Self::Removed(section) => Some(*section),
            Self::Reset => None,
        }
    }

    /// Splits an append into chunks of at most `max` rows. Removals and
    /// resets are never split.
    pub fn split(&self, max: usize) -> Vec<Modification> {
        match self {
            Self::Appended(section) if section.count > max => section
                .split(max)
                .into_iter()
                .map(Modification::Appended)
                .collect(),
            other => vec![*other],
        }
    }
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Appended(section) => write!(f, "Appended{section}"),
            Self::Removed(section) => write!(f, "Removed{section}"),
            Self::Reset => f.write_str("Reset"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_covers_section_exactly() {
        let chunks = Section::new(5usize, 7).split(3);
        assert_eq!(
            chunks,
            vec![
                Section::new(5usize, 3),
                Section::new(8usize, 3),
                Section::new(11usize, 1),
            ]
        );
    }

    #[test]
    fn test_split_only_affects_appends() {
        assert_eq!(Modification::removed(0, 100).split(10).len(), 1);
        assert_eq!(Modification::Reset.split(10), vec![Modification::Reset]);
        assert_eq!(Modification::appended(0, 25).split(10).len(), 3);
        assert_eq!(Modification::appended(0, 10).split(10).len(), 1);
    }

    #[test]
    fn test_minimum_bounding() {
        let a = Section::new(2usize, 3);
        let b = Section::new(10usize, 2);
        assert_eq!(a.minimum_bounding(&b), Section::new(2usize, 10));
    }

    #[test]
    fn test_end_of_section() {
        let section = Section::new(4usize, 2);
        assert!(section.is_end_of_section(LineIndex::from(5usize)));
        assert!(!section.is_end_of_section(LineIndex::from(4usize)));
        assert!(!Section::new(4usize, 0).is_end_of_section(LineIndex::INVALID));
        assert!(section.contains(LineIndex::from(4usize)));
        assert!(!section.contains(LineIndex::from(6usize)));
    }

    #[test]
    fn test_kind_and_section() {
        let appended = Modification::appended(3, 2);
        assert!(appended.is_appended() && !appended.is_reset());
        assert_eq!(appended.section(), Some(Section::new(3usize, 2)));

        let removed = Modification::removed(1, 4);
        assert!(!removed.is_appended());
        assert_eq!(removed.section().map(|s| s.start()), Some(1));
        assert_eq!(Modification::Reset.section(), None);
        assert_eq!(removed.to_string(), "Removed[1, 5)");
    }
}
