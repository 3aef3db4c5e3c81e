// Trigger events - symbolic note instructions handed to the sound renderer

use serde::{Deserialize, Serialize};

use crate::library::NoteEvent;

/// A note-start or note-stop scheduled inside the current audio block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Position in beats relative to the pattern or composition start
    pub time_beats: f64,

    /// Sample index within the block where the event falls
    pub sample_offset: u32,

    pub event: NoteEvent,

    /// Composer item index, `None` for single-pattern playback
    pub item: Option<usize>,
}
