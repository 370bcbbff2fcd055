//! The grouped title index handed to clients

use crate::entry::{TitleEntry, TitleFormat};
use serde::{Deserialize, Serialize};

/// Titles of a single format, in discovery order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleGroup {
    pub format: TitleFormat,
    pub entries: Vec<TitleEntry>,
}

/// A row of the flattened index, as a list view would render it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRow<'a> {
    /// Group header
    Header(&'static str),
    Title(&'a TitleEntry),
    /// Placeholder row for an index without titles
    Empty,
}

/// Ordered titles grouped by format
///
/// Every format appears at most once, so all of its entries stay contiguous.
/// Duplicate entries are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryIndex {
    groups: Vec<TitleGroup>,
}

impl LibraryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_groups(groups: Vec<TitleGroup>) -> Self {
        let mut index = Self::new();
        for group in groups {
            index.extend_group(group.format, group.entries);
        }
        index
    }

    /// Append one entry to the group of its format
    pub fn push(&mut self, entry: TitleEntry) {
        self.group_mut(entry.format()).entries.push(entry);
    }

    /// Append entries of one format; an empty batch adds no group
    pub fn extend_group(&mut self, format: TitleFormat, entries: Vec<TitleEntry>) {
        if entries.is_empty() {
            return;
        }
        self.group_mut(format).entries.extend(entries);
    }

    pub fn groups(&self) -> &[TitleGroup] {
        &self.groups
    }

    /// All entries in group order
    pub fn entries(&self) -> impl Iterator<Item = &TitleEntry> {
        self.groups.iter().flat_map(|group| group.entries.iter())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|group| group.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }

    /// Header and title rows; a lone [`IndexRow::Empty`] when nothing was found
    pub fn rows(&self) -> Vec<IndexRow<'_>> {
        if self.is_empty() {
            return vec![IndexRow::Empty];
        }

        let mut rows = Vec::with_capacity(self.len() + self.groups.len());
        for group in &self.groups {
            rows.push(IndexRow::Header(group.format.label()));
            rows.extend(group.entries.iter().map(IndexRow::Title));
        }
        rows
    }

    fn group_mut(&mut self, format: TitleFormat) -> &mut TitleGroup {
        let position = match self.groups.iter().position(|group| group.format == format) {
            Some(position) => position,
            None => {
                self.groups.push(TitleGroup {
                    format,
                    entries: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        &mut self.groups[position]
    }
}
