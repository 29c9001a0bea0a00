//! Tag combobox: filter existing tags and offer new ones.

use syncwell_core::Tag;
use uuid::Uuid;

pub const MAX_TAG_NAME_LEN: usize = 50;

/// What the picker offers for the current input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagOptions {
    pub matches: Vec<Tag>,
    /// Trimmed input, when it may be created as a new tag.
    pub creatable: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TagPicker {
    selected: Vec<Tag>,
}

impl TagPicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selected(selected: Vec<Tag>) -> Self {
        Self { selected }
    }

    pub fn selected(&self) -> &[Tag] {
        &self.selected
    }

    pub fn selected_names(&self) -> Vec<String> {
        self.selected.iter().map(|t| t.name.clone()).collect()
    }

    pub fn is_selected(&self, id: Uuid) -> bool {
        self.selected.iter().any(|t| t.id == id)
    }

    /// Returns false when the tag was already selected.
    pub fn select(&mut self, tag: Tag) -> bool {
        if self.is_selected(tag.id) {
            return false;
        }
        self.selected.push(tag);
        true
    }

    pub fn deselect(&mut self, id: Uuid) -> bool {
        let before = self.selected.len();
        self.selected.retain(|t| t.id != id);
        before != self.selected.len()
    }

    /// Filter `available` by `query`, case-insensitively, skipping selected tags.
    pub fn options(&self, available: &[Tag], query: &str) -> TagOptions {
        let trimmed = query.trim();
        let needle = trimmed.to_lowercase();

        let matches = available
            .iter()
            .filter(|t| !self.is_selected(t.id))
            .filter(|t| t.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();

        let length = trimmed.chars().count();
        let taken = available
            .iter()
            .chain(self.selected.iter())
            .any(|t| t.name.to_lowercase() == needle);
        let creatable = (length > 0 && length <= MAX_TAG_NAME_LEN && !taken)
            .then(|| trimmed.to_string());

        TagOptions { matches, creatable }
    }
}
