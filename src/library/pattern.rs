// Pattern bodies - beat-relative note events parsed from groove files
// Events are kept sorted so playback can binary-search a beat interval

use serde::{Deserialize, Serialize};

/// A symbolic note-start or note-stop instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteEvent {
    On { channel: u8, key: u8, velocity: u8 },
    Off { channel: u8, key: u8 },
}

impl NoteEvent {
    pub fn is_note_on(&self) -> bool {
        matches!(self, NoteEvent::On { .. })
    }

    pub fn key(&self) -> u8 {
        match *self {
            NoteEvent::On { key, .. } | NoteEvent::Off { key, .. } => key,
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            NoteEvent::On { channel, .. } | NoteEvent::Off { channel, .. } => channel,
        }
    }
}

/// A note event positioned in beats (quarter notes) from the pattern start
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub time_beats: f64,
    pub event: NoteEvent,
}

/// Time signature taken from the first time-signature marker of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub const FOUR_FOUR: TimeSignature = TimeSignature {
        numerator: 4,
        denominator: 4,
    };

    /// Beats per bar used for bar-based lengths (the numerator, never zero)
    pub fn beats_per_bar(&self) -> f64 {
        self.numerator.max(1) as f64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature::FOUR_FOUR
    }
}

/// Parsed body of a groove pattern
///
/// Immutable once built; a re-load replaces the whole body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Length in beats, always a whole number of bars (minimum one bar)
    pub length_beats: f64,

    pub time_signature: TimeSignature,

    /// Tempo of the first tempo marker in the file, if any
    pub tempo_bpm: Option<f64>,

    /// Note events sorted ascending by time
    pub events: Vec<TimedEvent>,
}

impl Pattern {
    /// Build a pattern body, sorting events and deriving the bar-rounded length
    pub fn new(
        mut events: Vec<TimedEvent>,
        time_signature: TimeSignature,
        tempo_bpm: Option<f64>,
    ) -> Self {
        // Stable sort keeps file order for simultaneous events
        events.sort_by(|a, b| a.time_beats.total_cmp(&b.time_beats));
        let length_beats = pattern_length(&events, time_signature);

        Pattern {
            length_beats,
            time_signature,
            tempo_bpm,
            events,
        }
    }

    pub fn beats_per_bar(&self) -> f64 {
        self.time_signature.beats_per_bar()
    }

    pub fn note_on_count(&self) -> usize {
        self.events.iter().filter(|e| e.event.is_note_on()).count()
    }

    /// Events whose time lies in `(lo, hi]`, or `[lo, hi]` when `include_lo` is set
    pub fn events_between(&self, lo: f64, hi: f64, include_lo: bool) -> &[TimedEvent] {
        let start = if include_lo {
            self.events.partition_point(|e| e.time_beats < lo)
        } else {
            self.events.partition_point(|e| e.time_beats <= lo)
        };
        let end = self.events.partition_point(|e| e.time_beats <= hi);

        if end <= start {
            return &[];
        }
        &self.events[start..end]
    }
}

/// Length of a pattern: the last event rounded up to whole bars, at least one bar
pub fn pattern_length(events: &[TimedEvent], time_signature: TimeSignature) -> f64 {
    let beats_per_bar = time_signature.beats_per_bar();

    let max_time = events
        .iter()
        .map(|e| e.time_beats)
        .fold(0.0f64, f64::max);

    let bars = (max_time / beats_per_bar).ceil().max(1.0);
    bars * beats_per_bar
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on(time_beats: f64, key: u8) -> TimedEvent {
        TimedEvent {
            time_beats,
            event: NoteEvent::On {
                channel: 9,
                key,
                velocity: 100,
            },
        }
    }

    #[test]
    fn test_empty_pattern_is_one_bar() {
        let pattern = Pattern::new(Vec::new(), TimeSignature::default(), None);
        assert_eq!(pattern.length_beats, 4.0);

        let waltz = TimeSignature {
            numerator: 3,
            denominator: 4,
        };
        let pattern = Pattern::new(Vec::new(), waltz, None);
        assert_eq!(pattern.length_beats, 3.0);
    }

    #[test]
    fn test_length_rounds_up_to_bar() {
        let pattern = Pattern::new(vec![on(4.5, 36)], TimeSignature::default(), None);
        assert_eq!(pattern.length_beats, 8.0);

        // An event exactly on the bar line does not add another bar
        let pattern = Pattern::new(vec![on(4.0, 36)], TimeSignature::default(), None);
        assert_eq!(pattern.length_beats, 4.0);
    }

    #[test]
    fn test_events_sorted_on_build() {
        let pattern = Pattern::new(
            vec![on(2.0, 38), on(0.0, 36), on(1.0, 42)],
            TimeSignature::default(),
            None,
        );
        let times: Vec<f64> = pattern.events.iter().map(|e| e.time_beats).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_events_between_half_open() {
        let pattern = Pattern::new(
            vec![on(0.0, 36), on(1.0, 38), on(2.0, 42), on(3.0, 38)],
            TimeSignature::default(),
            None,
        );

        let hits = pattern.events_between(1.0, 3.0, false);
        let times: Vec<f64> = hits.iter().map(|e| e.time_beats).collect();
        assert_eq!(times, vec![2.0, 3.0]);

        let hits = pattern.events_between(0.0, 1.0, true);
        assert_eq!(hits.len(), 2);

        assert!(pattern.events_between(0.0, 0.0, false).is_empty());
        assert!(pattern.events_between(3.0, 1.0, false).is_empty());
    }

    #[test]
    fn test_note_on_count() {
        let mut events = vec![on(0.0, 36)];
        events.push(TimedEvent {
            time_beats: 0.5,
            event: NoteEvent::Off { channel: 9, key: 36 },
        });
        let pattern = Pattern::new(events, TimeSignature::default(), None);
        assert_eq!(pattern.note_on_count(), 1);
    }
}
