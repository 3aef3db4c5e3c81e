// Composer timeline - gap-free sequence of pattern instances
// Items are always packed: each one starts where the previous one ends

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::library::{LibraryError, Pattern, PatternId, PatternStore};

/// One pattern instance placed on the timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComposerItem {
    pub pattern: PatternId,

    /// Position of the item on the timeline in beats
    pub start_beat: f64,

    /// Played length, never longer than the referenced pattern
    pub length_beats: f64,
}

impl ComposerItem {
    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.length_beats
    }
}

/// Ordered, packed list of composer items
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposerTimeline {
    items: Vec<ComposerItem>,
}

impl ComposerTimeline {
    pub fn new() -> Self {
        ComposerTimeline::default()
    }

    /// Append a pattern instance
    ///
    /// A `bar_count` of 0 uses the full pattern; otherwise the length is
    /// `bar_count * beats_per_bar`, clipped to the pattern's own length.
    pub fn add_item(&mut self, id: PatternId, pattern: &Pattern, bar_count: u32) -> ComposerItem {
        let length_beats = if bar_count == 0 {
            pattern.length_beats
        } else {
            (bar_count as f64 * pattern.beats_per_bar()).min(pattern.length_beats)
        };

        let item = ComposerItem {
            pattern: id,
            start_beat: self.total_length(),
            length_beats,
        };
        self.items.push(item);
        item
    }

    /// Remove an item, shifting later items left; out-of-range is a no-op
    pub fn remove_item(&mut self, index: usize) -> Option<ComposerItem> {
        if index >= self.items.len() {
            return None;
        }

        let removed = self.items.remove(index);
        for item in &mut self.items[index..] {
            item.start_beat -= removed.length_beats;
        }
        // Re-pack to keep float drift out of long edit sessions
        self.repack();
        Some(removed)
    }

    /// Move an item to a new index; out-of-range is a no-op
    pub fn move_item(&mut self, from: usize, to: usize) -> bool {
        if from >= self.items.len() || to >= self.items.len() {
            return false;
        }
        if from != to {
            let item = self.items.remove(from);
            self.items.insert(to, item);
            self.repack();
        }
        true
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn total_length(&self) -> f64 {
        self.items.iter().map(|item| item.length_beats).sum()
    }

    pub fn items(&self) -> &[ComposerItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Snapshot the timeline with every referenced body loaded
    pub fn resolve(&self, store: &PatternStore) -> Result<Composition, LibraryError> {
        let items = self
            .items
            .iter()
            .map(|item| {
                Ok(ScheduledItem {
                    item: *item,
                    pattern: store.load(item.pattern)?,
                })
            })
            .collect::<Result<Vec<_>, LibraryError>>()?;

        Ok(Composition::new(items))
    }

    fn repack(&mut self) {
        let mut start = 0.0;
        for item in &mut self.items {
            item.start_beat = start;
            start += item.length_beats;
        }
    }
}

/// A timeline item paired with its loaded pattern body
#[derive(Debug, Clone)]
pub struct ScheduledItem {
    pub item: ComposerItem,
    pub pattern: Arc<Pattern>,
}

/// Immutable, fully-loaded snapshot of the timeline used by playback and export
#[derive(Debug, Clone, Default)]
pub struct Composition {
    pub items: Vec<ScheduledItem>,
    pub total_length: f64,
}

impl Composition {
    pub fn new(items: Vec<ScheduledItem>) -> Self {
        let total_length = items.iter().map(|s| s.item.length_beats).sum();
        Composition {
            items,
            total_length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
