// MIDI Export - Write a composition as a single-track standard MIDI file
// Every note-start in the file has a matching note-stop

use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::timeline::Composition;
use crate::library::NoteEvent;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Composition is empty")]
    EmptyComposition,

    #[error("Failed to write MIDI: {0}")]
    Midi(#[from] std::io::Error),

    #[error("Export storage error: {0}")]
    Storage(#[from] StorageError),
}

/// MIDI export options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiExportOptions {
    /// Pulses per quarter note
    pub ppq: u16,

    /// Tempo written to the tempo marker
    pub bpm: f64,

    pub track_name: String,
}

impl Default for MidiExportOptions {
    fn default() -> Self {
        MidiExportOptions {
            ppq: 480,
            bpm: 120.0,
            track_name: "Groove Composition".to_string(),
        }
    }
}

/// Export a composition to MIDI file bytes
///
/// Events land at `(item start + event time) * ppq`. Note-starts at or beyond an item's
/// end are dropped, note-stops exactly at the end are kept, and notes still sounding
/// when the item ends are closed there.
pub fn export_composition(
    composition: &Composition,
    options: &MidiExportOptions,
) -> Result<Vec<u8>, ExportError> {
    if composition.is_empty() {
        return Err(ExportError::EmptyComposition);
    }

    let ppq = options.ppq.max(1);
    let to_tick = |beats: f64| (beats * ppq as f64).round().max(0.0) as u32;

    let mut notes: Vec<(u32, NoteEvent)> = Vec::new();

    for scheduled in &composition.items {
        let item = &scheduled.item;
        let mut open: HashMap<(u8, u8), Vec<u32>> = HashMap::new();

        for timed in &scheduled.pattern.events {
            let t = timed.time_beats;
            if t > item.length_beats {
                break;
            }
            let tick = to_tick(item.start_beat + t);

            match timed.event {
                NoteEvent::On { channel, key, .. } => {
                    if t < item.length_beats {
                        open.entry((channel, key)).or_default().push(tick);
                        notes.push((tick, timed.event));
                    }
                }
                NoteEvent::Off { channel, key } => {
                    // Stops with no sounding note would leave the file unbalanced
                    let Some(on_tick) = open.get_mut(&(channel, key)).and_then(|ticks| ticks.pop())
                    else {
                        continue;
                    };
                    notes.push((tick.max(on_tick + 1), timed.event));
                }
            }
        }

        let end_tick = to_tick(item.end_beat());
        for ((channel, key), ticks) in open {
            for on_tick in ticks {
                notes.push((end_tick.max(on_tick + 1), NoteEvent::Off { channel, key }));
            }
        }
    }

    // Stops sort before starts on the same tick so re-triggers stay balanced
    notes.sort_by_key(|(tick, event)| (*tick, event.is_note_on()));

    let mut track = Track::new();
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(options.track_name.as_bytes())),
    });
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(tempo_micros(options.bpm).into())),
    });
    track.push(TrackEvent {
        delta: 0.into(),
        // 4/4, 24 clocks per click, 8 32nds per quarter
        kind: TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8)),
    });

    let mut last_tick = 0;
    for (tick, event) in notes {
        track.push(TrackEvent {
            delta: tick.saturating_sub(last_tick).into(),
            kind: note_kind(event),
        });
        last_tick = tick;
    }

    let end_tick = to_tick(composition.total_length).max(last_tick);
    track.push(TrackEvent {
        delta: (end_tick - last_tick).into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(ppq.into()),
        },
        tracks: vec![track],
    };

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;

    log::debug!(
        "Exported composition: {} items, {} beats, {} bytes",
        composition.items.len(),
        composition.total_length,
        bytes.len()
    );

    Ok(bytes)
}

/// Microseconds per quarter note, clamped to the 24-bit tempo field
fn tempo_micros(bpm: f64) -> u32 {
    let bpm = if bpm > 0.0 { bpm } else { 120.0 };
    ((60_000_000.0 / bpm).round() as u32).clamp(1, 0xFF_FFFF)
}

fn note_kind<'a>(event: NoteEvent) -> TrackEventKind<'a> {
    match event {
        NoteEvent::On {
            channel,
            key,
            velocity,
        } => TrackEventKind::Midi {
            channel: (channel & 0x0F).into(),
            message: MidiMessage::NoteOn {
                key: (key & 0x7F).into(),
                vel: (velocity & 0x7F).into(),
            },
        },
        NoteEvent::Off { channel, key } => TrackEventKind::Midi {
            channel: (channel & 0x0F).into(),
            message: MidiMessage::NoteOff {
                key: (key & 0x7F).into(),
                vel: 0.into(),
            },
        },
    }
}
