// Library module - groove catalog, MIDI parsing and the pattern body cache

pub mod catalog;
pub mod parse;
pub mod pattern;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::{Catalog, Category, PatternId, PatternInfo};
pub use parse::{load_pattern_file, parse_pattern, LibraryError};
pub use pattern::{NoteEvent, Pattern, TimeSignature, TimedEvent};
pub use store::PatternStore;
