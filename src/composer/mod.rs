// Composer - user-built pattern timeline and its MIDI export

pub mod export;
pub mod timeline;

pub use export::{export_composition, ExportError, MidiExportOptions};
pub use timeline::{ComposerItem, ComposerTimeline, Composition, ScheduledItem};
